//! Finding recurring transactions in the stored transaction history.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    category::{CategorizableTransaction, categorize, get_categories_by_id},
    recurring::{
        Frequency, RecurringForm, RecurringId, create_recurring_transaction,
        find_recurring_by_merchant,
    },
};

/// Amounts may differ from the median by at most this fraction.
const AMOUNT_TOLERANCE: f64 = 0.2;

/// The request body for pattern detection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionOptions {
    #[serde(default = "default_min_occurrences")]
    pub min_occurrences: usize,
    #[serde(default = "default_auto_create")]
    pub auto_create: bool,
}

fn default_min_occurrences() -> usize {
    3
}

fn default_auto_create() -> bool {
    true
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            min_occurrences: default_min_occurrences(),
            auto_create: default_auto_create(),
        }
    }
}

/// The fields of a stored transaction that detection looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTransaction {
    pub name: String,
    pub merchant_name: Option<String>,
    pub amount: f64,
    pub date: Date,
    pub primary_category: Option<String>,
    pub detailed_category: Option<String>,
}

/// A repeating series of transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedPattern {
    pub merchant: String,
    /// The median amount, always positive.
    pub amount: f64,
    pub frequency: Frequency,
    pub is_income: bool,
    pub occurrences: usize,
    pub first_date: Date,
    pub last_date: Date,
    pub next_date: Date,
    pub primary_category: Option<String>,
    #[serde(skip)]
    pub detailed_category: Option<String>,
    pub existing_id: Option<RecurringId>,
    pub created_id: Option<RecurringId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub patterns_detected: usize,
    pub created_count: usize,
    pub existing_count: usize,
    pub patterns: Vec<DetectedPattern>,
}

/// Lowercase `text` and drop everything but letters and spaces, so that
/// "NETFLIX.COM 1234" and "Netflix.com  5678" group together.
pub fn normalize_merchant(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;

    if values.len() % 2 == 0 {
        Some((values[middle - 1] + values[middle]) / 2.0)
    } else {
        Some(values[middle])
    }
}

fn find_pattern(group: &[&CandidateTransaction]) -> Option<DetectedPattern> {
    let mut amounts: Vec<f64> = group.iter().map(|t| t.amount.abs()).collect();
    let median_amount = median(&mut amounts)?;
    if median_amount == 0.0
        || amounts
            .iter()
            .any(|amount| (amount - median_amount).abs() > median_amount * AMOUNT_TOLERANCE)
    {
        return None;
    }

    let mut dates: Vec<Date> = group.iter().map(|t| t.date).collect();
    dates.sort();
    let mut gaps: Vec<f64> = dates
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).whole_days() as f64)
        .collect();
    let frequency = Frequency::from_interval_days(median(&mut gaps)?)?;

    let latest = group.iter().max_by_key(|t| t.date)?;
    let first_date = *dates.first()?;
    let last_date = *dates.last()?;

    Some(DetectedPattern {
        merchant: latest
            .merchant_name
            .as_deref()
            .unwrap_or(&latest.name)
            .trim()
            .to_owned(),
        amount: (median_amount * 100.0).round() / 100.0,
        frequency,
        is_income: latest.amount < 0.0,
        occurrences: group.len(),
        first_date,
        last_date,
        next_date: frequency.next_after(last_date),
        primary_category: latest.primary_category.clone(),
        detailed_category: latest.detailed_category.clone(),
        existing_id: None,
        created_id: None,
    })
}

/// Find recurring patterns in `transactions`.
///
/// Transactions are grouped by normalized merchant and direction. A group
/// becomes a pattern when it has at least `min_occurrences` members, every
/// amount is within 20% of the median and the median gap between dates
/// matches a [Frequency].
pub fn detect_patterns(
    transactions: &[CandidateTransaction],
    min_occurrences: usize,
) -> Vec<DetectedPattern> {
    let mut groups: BTreeMap<(String, bool), Vec<&CandidateTransaction>> = BTreeMap::new();

    for transaction in transactions {
        let merchant = transaction
            .merchant_name
            .as_deref()
            .unwrap_or(&transaction.name);
        let key = normalize_merchant(merchant);
        if key.is_empty() {
            continue;
        }

        groups
            .entry((key, transaction.amount < 0.0))
            .or_default()
            .push(transaction);
    }

    let min_occurrences = min_occurrences.max(2);
    let mut patterns: Vec<DetectedPattern> = groups
        .values()
        .filter(|group| group.len() >= min_occurrences)
        .filter_map(|group| find_pattern(group))
        .collect();

    patterns.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.merchant.cmp(&b.merchant))
    });

    patterns
}

fn get_candidate_transactions(
    connection: &Connection,
) -> Result<Vec<CandidateTransaction>, Error> {
    connection
        .prepare(
            "SELECT name, merchant_name, amount, date, primary_category, detailed_category \
            FROM \"transaction\" WHERE pending = 0 AND exclude_from_reports = 0",
        )?
        .query_map([], |row| {
            Ok(CandidateTransaction {
                name: row.get(0)?,
                merchant_name: row.get(1)?,
                amount: row.get(2)?,
                date: row.get(3)?,
                primary_category: row.get(4)?,
                detailed_category: row.get(5)?,
            })
        })?
        .map(|maybe_candidate| maybe_candidate.map_err(Error::from))
        .collect()
}

/// Detect patterns in the stored history and match each one to an existing
/// recurring transaction (same merchant and frequency), creating one when
/// there is no match and `options.auto_create` is set.
pub fn detect_recurring_transactions(
    options: &DetectionOptions,
    connection: &Connection,
) -> Result<DetectionResult, Error> {
    let mut patterns =
        detect_patterns(&get_candidate_transactions(connection)?, options.min_occurrences);
    let categories = get_categories_by_id(connection)?;

    let transaction = connection.unchecked_transaction()?;

    for pattern in &mut patterns {
        if let Some(existing) =
            find_recurring_by_merchant(&pattern.merchant, pattern.frequency, &transaction)?
        {
            pattern.existing_id = Some(existing.id);
            continue;
        }

        if !options.auto_create {
            continue;
        }

        let category_id = categorize(
            &CategorizableTransaction {
                user_category: None,
                primary_category: pattern.primary_category.clone(),
                detailed_category: pattern.detailed_category.clone(),
                amount: pattern.amount,
            },
            &categories,
        );

        let created = create_recurring_transaction(
            &RecurringForm {
                merchant_name: Some(pattern.merchant.clone()),
                is_income: pattern.is_income,
                category_id,
                next_date: Some(pattern.next_date),
                last_date: Some(pattern.last_date),
                ..RecurringForm::new(&pattern.merchant, pattern.amount, pattern.frequency)
            },
            &transaction,
        )?;
        pattern.created_id = Some(created.id);
    }

    transaction.commit()?;

    tracing::info!("Detected {} recurring transaction patterns", patterns.len());

    Ok(DetectionResult {
        patterns_detected: patterns.len(),
        created_count: patterns.iter().filter(|p| p.created_id.is_some()).count(),
        existing_count: patterns.iter().filter(|p| p.existing_id.is_some()).count(),
        patterns,
    })
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use time::{Date, Duration, macros::date};

    use crate::{
        category::test_utils::create_test_category,
        db::initialize,
        recurring::{
            Frequency, RecurringForm, RecurringQuery, create_recurring_transaction,
            get_recurring_transactions,
        },
        transaction::{
            Transaction, create_manual_transaction, set_exclude_from_reports,
            test_utils::create_institution_with_account,
        },
    };

    use super::{
        CandidateTransaction, DetectionOptions, detect_patterns, detect_recurring_transactions,
        normalize_merchant,
    };

    fn candidate(merchant: &str, amount: f64, date: Date) -> CandidateTransaction {
        CandidateTransaction {
            name: format!("{merchant} purchase"),
            merchant_name: Some(merchant.to_owned()),
            amount,
            date,
            primary_category: Some("ENTERTAINMENT".to_owned()),
            detailed_category: None,
        }
    }

    fn every(days: i64, count: i64, merchant: &str, amount: f64) -> Vec<CandidateTransaction> {
        let start = date!(2024 - 01 - 03);
        (0..count)
            .map(|i| candidate(merchant, amount, start + Duration::days(days * i)))
            .collect()
    }

    #[test]
    fn normalizes_merchants() {
        assert_eq!(normalize_merchant("NETFLIX.COM  #1234"), "netflixcom");
        assert_eq!(normalize_merchant("  Sq *Blue   Bottle 42 "), "sq blue bottle");
        assert_eq!(normalize_merchant("1234"), "");
    }

    #[test]
    fn detects_monthly_subscription() {
        let transactions = every(30, 4, "Netflix", 15.49);

        let patterns = detect_patterns(&transactions, 3);

        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.merchant, "Netflix");
        assert_eq!(pattern.frequency, Frequency::Monthly);
        assert_eq!(pattern.amount, 15.49);
        assert_eq!(pattern.occurrences, 4);
        assert!(!pattern.is_income);
        assert_eq!(pattern.first_date, date!(2024 - 01 - 03));
        assert_eq!(pattern.last_date, date!(2024 - 04 - 02));
        assert_eq!(pattern.next_date, date!(2024 - 05 - 02));
    }

    #[test]
    fn classifies_each_frequency() {
        let cases = [
            (7, Frequency::Weekly),
            (14, Frequency::Biweekly),
            (91, Frequency::Quarterly),
            (365, Frequency::Yearly),
        ];

        for (days, frequency) in cases {
            let patterns = detect_patterns(&every(days, 3, "Gym", 20.0), 3);

            assert_eq!(patterns.len(), 1, "{days} days");
            assert_eq!(patterns[0].frequency, frequency);
        }
    }

    #[test]
    fn needs_minimum_occurrences() {
        let transactions = every(30, 2, "Netflix", 15.49);

        assert!(detect_patterns(&transactions, 3).is_empty());
        assert_eq!(detect_patterns(&transactions, 2).len(), 1);
    }

    #[test]
    fn rejects_inconsistent_amounts() {
        let mut transactions = every(30, 3, "Grocer", 50.0);
        transactions[1].amount = 80.0;

        assert!(detect_patterns(&transactions, 3).is_empty());
    }

    #[test]
    fn rejects_irregular_gaps() {
        let transactions = every(20, 4, "Cafe", 5.0);

        assert!(detect_patterns(&transactions, 3).is_empty());
    }

    #[test]
    fn separates_income_from_expenses() {
        let mut transactions = every(14, 3, "Acme Corp", -2500.0);
        transactions.extend(every(30, 3, "Acme Corp", 10.0));

        let patterns = detect_patterns(&transactions, 3);

        assert_eq!(patterns.len(), 2);
        assert!(patterns.iter().any(|p| p.is_income && p.frequency == Frequency::Biweekly));
        assert!(patterns.iter().any(|p| !p.is_income && p.frequency == Frequency::Monthly));
    }

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn creates_then_matches_existing() {
        let connection = get_test_connection();
        let (_, account_id) = create_institution_with_account("item-1", &connection);
        let category = create_test_category("Entertainment", &["ENTERTAINMENT"], None, &connection);
        for transaction in every(30, 3, "Spotify", 11.99) {
            create_manual_transaction(
                Transaction::build(account_id, transaction.amount, transaction.date)
                    .merchant_name(transaction.merchant_name)
                    .category("ENTERTAINMENT"),
                &connection,
            )
            .unwrap();
        }

        let first =
            detect_recurring_transactions(&DetectionOptions::default(), &connection).unwrap();
        let second =
            detect_recurring_transactions(&DetectionOptions::default(), &connection).unwrap();

        assert_eq!(first.patterns_detected, 1);
        assert_eq!(first.created_count, 1);
        assert_eq!(first.existing_count, 0);
        assert_eq!(second.created_count, 0);
        assert_eq!(second.existing_count, 1);
        assert_eq!(second.patterns[0].existing_id, first.patterns[0].created_id);

        let saved = get_recurring_transactions(&RecurringQuery::default(), &connection).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].merchant_name.as_deref(), Some("Spotify"));
        assert_eq!(saved[0].category_id, Some(category.id));
        assert_eq!(saved[0].next_date, Some(first.patterns[0].next_date));
    }

    #[test]
    fn without_auto_create_only_reports() {
        let connection = get_test_connection();
        let (_, account_id) = create_institution_with_account("item-1", &connection);
        for transaction in every(7, 3, "Gym", 20.0) {
            create_manual_transaction(
                Transaction::build(account_id, transaction.amount, transaction.date)
                    .merchant_name(transaction.merchant_name),
                &connection,
            )
            .unwrap();
        }
        let mut form = RecurringForm::new("Other", 5.0, Frequency::Monthly);
        form.merchant_name = Some("Other".to_owned());
        create_recurring_transaction(&form, &connection).unwrap();

        let result = detect_recurring_transactions(
            &DetectionOptions {
                min_occurrences: 3,
                auto_create: false,
            },
            &connection,
        )
        .unwrap();

        assert_eq!(result.patterns_detected, 1);
        assert_eq!(result.patterns[0].created_id, None);
        assert_eq!(result.patterns[0].existing_id, None);
        let saved = get_recurring_transactions(&RecurringQuery::default(), &connection).unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn excluded_transactions_are_ignored() {
        let connection = get_test_connection();
        let (_, account_id) = create_institution_with_account("item-1", &connection);
        for transaction in every(30, 3, "Spotify", 11.99) {
            let created = create_manual_transaction(
                Transaction::build(account_id, transaction.amount, transaction.date)
                    .merchant_name(transaction.merchant_name),
                &connection,
            )
            .unwrap();
            set_exclude_from_reports(created.id, Some(true), &connection).unwrap();
        }

        let result =
            detect_recurring_transactions(&DetectionOptions::default(), &connection).unwrap();

        assert_eq!(result.patterns_detected, 0);
    }
}
