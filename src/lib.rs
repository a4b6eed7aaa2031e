//! # WSJ 2027 Back Office
//!
//! Batch mailings and the SEPA direct debit pipeline for the German
//! contingent of the World Scout Jamboree 2027, operating directly on
//! the Hitobito registration database. The library is consumed by the
//! `wsjrdp-backoffice` CLI.

pub mod batch;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod mail;
pub mod models;
pub mod payment;
pub mod payment_role;
pub mod people;
pub mod query;
pub mod repositories;
pub mod sepa;
pub mod util;
