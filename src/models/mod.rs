//! # Data Models
//!
//! SeaORM entities for the Hitobito tables the back-office tools touch:
//! the people graph (people, tags, notes, roles, versions) and the
//! accounting tables (payment initiations, payment infos,
//! pre-notifications, accounting entries, camt transactions).

pub mod accounting_entry;
pub mod camt_transaction;
pub mod direct_debit_payment_info;
pub mod direct_debit_pre_notification;
pub mod fin_account;
pub mod note;
pub mod payment_initiation;
pub mod person;
pub mod role;
pub mod tag;
pub mod tagging;
pub mod version;

pub use accounting_entry::Entity as AccountingEntry;
pub use camt_transaction::Entity as CamtTransaction;
pub use direct_debit_payment_info::Entity as DirectDebitPaymentInfo;
pub use direct_debit_pre_notification::Entity as DirectDebitPreNotification;
pub use fin_account::Entity as FinAccount;
pub use note::Entity as Note;
pub use payment_initiation::Entity as PaymentInitiation;
pub use person::Entity as Person;
pub use role::Entity as Role;
pub use tag::Entity as Tag;
pub use tagging::Entity as Tagging;
pub use version::Entity as Version;
