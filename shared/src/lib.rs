//! Domain and wire types shared between the inbox poller and the
//! Application Store it talks to.

pub mod api;
pub mod models;

pub use api::{ApplicationLookupQuery, ErrorBody, NewApplicationRequest, UserRecord};
pub use models::{
    Application, ApplicationStatus, Classification, ClassificationKind, ListeningUser,
    MailboxCredential, UnknownStatus,
};
