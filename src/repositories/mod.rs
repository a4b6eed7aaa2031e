//! # Repository Layer
//!
//! Repositories encapsulate the SeaORM write operations against the
//! Hitobito tables. They are generic over [`sea_orm::ConnectionTrait`]
//! so a whole batch run can execute inside one transaction.

pub mod accounting;
pub mod person;

pub use accounting::{
    AccountingRepository, CamtIngestOutcome, CamtLinkOutcome,
    PRE_NOTIFICATION_STATUS_RETURNED,
};
pub use person::{PersonRepository, PersonUpdate, PrimaryGroupMove};

/// Hitobito person id changes and notes are attributed to.
pub const ADMINISTRATOR_ID: i64 = 1;
