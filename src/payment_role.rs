//! Payment roles and the fee schedule.
//!
//! Each participant carries a payment role string in the `payment_role`
//! column. The role determines the total fee and the installment plan.
//! Early payers settle the whole fee in one debit; regular payers follow
//! an eight-installment plan from December 2025 to May 2027.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// `(year, month)` key for installment plans. BTreeMap keeps them ordered.
pub type YearMonth = (i32, u32);

/// Due-date grid for the fee schedule. Position `i` in an installment
/// vector becomes due at `PAYMENT_DATES[i]`.
fn payment_dates() -> [NaiveDate; 12] {
    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap_or(NaiveDate::MIN);
    [
        NaiveDate::MIN,
        d(2025, 8, 1), // cut-off for the earliest early payers
        d(2025, 11, 1),
        d(2025, 12, 1),
        d(2026, 1, 1),
        d(2026, 2, 1),
        d(2026, 3, 1),
        d(2026, 8, 1),
        d(2026, 11, 1),
        d(2027, 2, 1),
        d(2027, 5, 1),
        NaiveDate::MAX,
    ]
}

const NOTIFICATION_DAYS: u64 = 4;

/// Payment role of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentRole {
    RegularPayerCmt,
    RegularPayerYp,
    RegularPayerUl,
    RegularPayerIst,
    EarlyPayerCmt,
    EarlyPayerYp,
    EarlyPayerUl,
    EarlyPayerIst,
}

impl PaymentRole {
    pub const ALL: [PaymentRole; 8] = [
        PaymentRole::RegularPayerCmt,
        PaymentRole::RegularPayerYp,
        PaymentRole::RegularPayerUl,
        PaymentRole::RegularPayerIst,
        PaymentRole::EarlyPayerCmt,
        PaymentRole::EarlyPayerYp,
        PaymentRole::EarlyPayerUl,
        PaymentRole::EarlyPayerIst,
    ];

    /// The string stored in the `payment_role` column.
    pub fn db_payment_role(self) -> &'static str {
        match self {
            PaymentRole::RegularPayerCmt => "RegularPayer::Group::Root::Member",
            PaymentRole::RegularPayerYp => "RegularPayer::Group::Unit::Member",
            PaymentRole::RegularPayerUl => "RegularPayer::Group::Unit::Leader",
            PaymentRole::RegularPayerIst => "RegularPayer::Group::Ist::Member",
            PaymentRole::EarlyPayerCmt => "EarlyPayer::Group::Root::Member",
            PaymentRole::EarlyPayerYp => "EarlyPayer::Group::Unit::Member",
            PaymentRole::EarlyPayerUl => "EarlyPayer::Group::Unit::Leader",
            PaymentRole::EarlyPayerIst => "EarlyPayer::Group::Ist::Member",
        }
    }

    pub fn from_db_payment_role(s: &str) -> Result<Self, QueryError> {
        PaymentRole::ALL
            .into_iter()
            .find(|role| role.db_payment_role() == s)
            .ok_or_else(|| QueryError::UnknownPaymentRole(s.to_string()))
    }

    pub fn is_early_payer(self) -> bool {
        self.db_payment_role().starts_with("EarlyPayer::")
    }

    pub fn is_yp(self) -> bool {
        matches!(self, PaymentRole::RegularPayerYp | PaymentRole::EarlyPayerYp)
    }

    /// CMT, YP, UL or IST.
    pub fn short_role_name(self) -> &'static str {
        match self {
            PaymentRole::RegularPayerCmt | PaymentRole::EarlyPayerCmt => "CMT",
            PaymentRole::RegularPayerYp | PaymentRole::EarlyPayerYp => "YP",
            PaymentRole::RegularPayerUl | PaymentRole::EarlyPayerUl => "UL",
            PaymentRole::RegularPayerIst | PaymentRole::EarlyPayerIst => "IST",
        }
    }

    /// Same role with the early-payer flag forced to `early_payer`.
    pub fn with_early_payer(self, early_payer: bool) -> PaymentRole {
        match (self.short_role_name(), early_payer) {
            ("CMT", false) => PaymentRole::RegularPayerCmt,
            ("CMT", true) => PaymentRole::EarlyPayerCmt,
            ("YP", false) => PaymentRole::RegularPayerYp,
            ("YP", true) => PaymentRole::EarlyPayerYp,
            ("UL", false) => PaymentRole::RegularPayerUl,
            ("UL", true) => PaymentRole::EarlyPayerUl,
            (_, false) => PaymentRole::RegularPayerIst,
            (_, true) => PaymentRole::EarlyPayerIst,
        }
    }

    pub fn regular_full_fee_eur(self) -> i64 {
        match self.short_role_name() {
            "YP" => 3400,
            "UL" => 2400,
            "IST" => 2600,
            _ => 1600,
        }
    }

    pub fn regular_full_fee_cents(self) -> i64 {
        self.regular_full_fee_eur() * 100
    }

    /// The eight regular installments in EUR, December 2025 first.
    fn regular_installments_eur(self) -> [i64; 8] {
        match self.short_role_name() {
            "YP" => [300, 500, 500, 500, 400, 400, 400, 400],
            "UL" => [150, 350, 350, 350, 300, 300, 300, 300],
            "IST" => [200, 400, 400, 400, 300, 300, 300, 300],
            _ => [50, 250, 250, 250, 200, 200, 200, 200],
        }
    }

    /// Installment vector aligned with the due-date grid.
    fn installments_on_grid_eur(self) -> [i64; 12] {
        let regular = self.regular_installments_eur();
        let mut grid = [0i64; 12];
        if self.is_early_payer() {
            grid[1] = self.regular_full_fee_eur();
        } else {
            grid[3..11].copy_from_slice(&regular);
        }
        grid
    }

    /// Accumulated fee due by `date` in EUR.
    ///
    /// Early payers who received their confirmation on or after
    /// 2025-08-01 get a grace period: nothing is due before 2025-11-01.
    pub fn fee_due_by_date_in_eur(self, date: NaiveDate, print_at: Option<NaiveDate>) -> i64 {
        let dates = payment_dates();
        let grid = self.installments_on_grid_eur();
        let pos = dates.partition_point(|d| *d <= date).saturating_sub(1);
        let amount: i64 = grid[..=pos].iter().sum();

        let aug_25 = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap_or(NaiveDate::MIN);
        let nov_25 = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap_or(NaiveDate::MIN);
        if self.is_early_payer() {
            if let Some(print_at) = print_at {
                if date < nov_25 && print_at >= aug_25 {
                    return 0;
                }
            }
        }
        amount
    }

    pub fn fee_due_by_date_in_cents(self, date: NaiveDate, print_at: Option<NaiveDate>) -> i64 {
        self.fee_due_by_date_in_eur(date, print_at) * 100
    }

    /// Installment plan as year-month to EUR amount.
    ///
    /// `early_payer` overrides the flag baked into the role. For early
    /// payers the whole fee lands on the first of the month after the
    /// notional payment date, which is `today` without a confirmation
    /// print date, otherwise `print_at` plus the notification period
    /// (but never before `today` while registration is still running).
    /// A `fee_reduction_eur` is consumed from the last installments
    /// backwards; zero installments are dropped.
    pub fn get_installments_eur(
        self,
        early_payer: Option<bool>,
        print_at: Option<NaiveDate>,
        today: NaiveDate,
        fee_reduction_eur: i64,
    ) -> BTreeMap<YearMonth, i64> {
        let single_payment_at = match print_at {
            None => today,
            Some(print_at) => {
                let notified = print_at
                    .checked_add_days(Days::new(NOTIFICATION_DAYS))
                    .unwrap_or(print_at);
                let registration_end = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or(today);
                if today < registration_end {
                    today.max(notified)
                } else {
                    notified
                }
            }
        };

        let early_payer = early_payer.unwrap_or_else(|| self.is_early_payer());
        if early_payer {
            let next_month = first_of_next_month(single_payment_at);
            let ym = (next_month.year(), next_month.month());
            let total_fee = (self.regular_full_fee_eur() - fee_reduction_eur).max(0);
            let mut plan = BTreeMap::new();
            if ym <= (2025, 12) {
                plan.insert((2026, 1), total_fee);
            } else {
                plan.insert(ym, total_fee);
            }
            return plan;
        }

        let dates = payment_dates();
        let mut grid = self.installments_on_grid_eur();
        let mut reduction = fee_reduction_eur;
        if reduction > 0 {
            for eur in grid.iter_mut().rev() {
                if reduction > *eur {
                    reduction -= *eur;
                    *eur = 0;
                } else {
                    *eur -= reduction;
                    break;
                }
            }
        }
        dates
            .iter()
            .zip(grid.iter())
            .filter(|(_, eur)| **eur != 0)
            .map(|(date, eur)| ((date.year(), date.month()), *eur))
            .collect()
    }

    pub fn get_installments_cents(
        self,
        early_payer: Option<bool>,
        print_at: Option<NaiveDate>,
        today: NaiveDate,
        fee_reduction_cents: i64,
    ) -> BTreeMap<YearMonth, i64> {
        // The fee table is whole euros, so the reduction rounds up to the
        // next full euro before it is applied.
        let fee_reduction_eur = (fee_reduction_cents + 99) / 100;
        self.get_installments_eur(early_payer, print_at, today, fee_reduction_eur)
            .into_iter()
            .map(|(ym, eur)| (ym, eur * 100))
            .collect()
    }
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Event role of a participant: unit member, unit leader, IST or CMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WsjRole {
    Cmt,
    Ul,
    Yp,
    Ist,
}

impl WsjRole {
    pub const ALL: [WsjRole; 4] = [WsjRole::Cmt, WsjRole::Ul, WsjRole::Yp, WsjRole::Ist];

    pub fn name(self) -> &'static str {
        match self {
            WsjRole::Cmt => "CMT",
            WsjRole::Ul => "UL",
            WsjRole::Yp => "YP",
            WsjRole::Ist => "IST",
        }
    }

    pub fn group_id(self) -> i64 {
        match self {
            WsjRole::Cmt => 1,
            WsjRole::Ul => 2,
            WsjRole::Yp => 3,
            WsjRole::Ist => 4,
        }
    }

    pub fn regular_payer_payment_role(self) -> PaymentRole {
        match self {
            WsjRole::Cmt => PaymentRole::RegularPayerCmt,
            WsjRole::Ul => PaymentRole::RegularPayerUl,
            WsjRole::Yp => PaymentRole::RegularPayerYp,
            WsjRole::Ist => PaymentRole::RegularPayerIst,
        }
    }

    pub fn early_payer_payment_role(self) -> PaymentRole {
        self.regular_payer_payment_role().with_early_payer(true)
    }

    pub fn regular_total_fee_eur(self) -> i64 {
        self.regular_payer_payment_role().regular_full_fee_eur()
    }

    pub fn from_name(name: &str) -> Result<Self, QueryError> {
        let upper = name.trim().to_uppercase();
        WsjRole::ALL
            .into_iter()
            .find(|role| role.name() == upper)
            .ok_or(QueryError::UnknownRole(name.to_string()))
    }
}

impl std::fmt::Display for WsjRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::fmt::Display for PaymentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.db_payment_role())
    }
}
