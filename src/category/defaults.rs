use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;

use crate::{Error, category::CategoryId, db::to_json_text};

struct DefaultCategory {
    name: &'static str,
    icon: &'static str,
    color: &'static str,
    plaid_categories: &'static [&'static str],
    children: &'static [(&'static str, &'static [&'static str])],
}

const DEFAULT_CATEGORIES: &[DefaultCategory] = &[
    DefaultCategory {
        name: "Auto & Transport",
        icon: "🚗",
        color: "#ef4444",
        plaid_categories: &["TRANSPORTATION"],
        children: &[
            ("Gas & Fuel", &["TRANSPORTATION_GAS"]),
            ("Parking", &["TRANSPORTATION_PARKING"]),
            ("Public Transportation", &["TRANSPORTATION_PUBLIC_TRANSIT"]),
            ("Rideshare & Taxi", &["TRANSPORTATION_TAXIS_AND_RIDE_SHARES"]),
        ],
    },
    DefaultCategory {
        name: "Bills & Utilities",
        icon: "⚡",
        color: "#f59e0b",
        plaid_categories: &["RENT_AND_UTILITIES"],
        children: &[
            ("Gas & Electric", &["RENT_AND_UTILITIES_GAS_AND_ELECTRICITY"]),
            (
                "Internet & Phone",
                &["RENT_AND_UTILITIES_INTERNET_AND_CABLE", "RENT_AND_UTILITIES_TELEPHONE"],
            ),
            ("Water", &["RENT_AND_UTILITIES_WATER"]),
            ("Rent", &["RENT_AND_UTILITIES_RENT"]),
        ],
    },
    DefaultCategory {
        name: "Dining & Drinks",
        icon: "🍽️",
        color: "#ec4899",
        plaid_categories: &["FOOD_AND_DRINK"],
        children: &[
            ("Bars", &["FOOD_AND_DRINK_BEER_WINE_AND_LIQUOR"]),
            ("Coffee Shops", &["FOOD_AND_DRINK_COFFEE"]),
            ("Fast Food", &["FOOD_AND_DRINK_FAST_FOOD"]),
            ("Restaurants", &["FOOD_AND_DRINK_RESTAURANT"]),
        ],
    },
    DefaultCategory {
        name: "Groceries",
        icon: "🛒",
        color: "#22c55e",
        plaid_categories: &["FOOD_AND_DRINK_GROCERIES"],
        children: &[],
    },
    DefaultCategory {
        name: "Entertainment",
        icon: "🎬",
        color: "#8b5cf6",
        plaid_categories: &["ENTERTAINMENT"],
        children: &[
            ("Music & Streaming", &["ENTERTAINMENT_MUSIC_AND_AUDIO", "ENTERTAINMENT_TV_AND_MOVIES"]),
            ("Games", &["ENTERTAINMENT_VIDEO_GAMES"]),
        ],
    },
    DefaultCategory {
        name: "Fees & Charges",
        icon: "💳",
        color: "#64748b",
        plaid_categories: &["BANK_FEES"],
        children: &[
            ("ATM Fee", &["BANK_FEES_ATM_FEES"]),
            ("Interest Charge", &["BANK_FEES_INTEREST_CHARGE"]),
            ("Late Fee", &["BANK_FEES_LATE_PAYMENT"]),
        ],
    },
    DefaultCategory {
        name: "Health",
        icon: "🏥",
        color: "#14b8a6",
        plaid_categories: &["MEDICAL"],
        children: &[
            ("Dentist", &["MEDICAL_DENTAL_CARE"]),
            ("Doctor", &["MEDICAL_PRIMARY_CARE"]),
            ("Pharmacy", &["MEDICAL_PHARMACIES_AND_SUPPLEMENTS"]),
            ("Gym", &["PERSONAL_CARE_GYMS_AND_FITNESS_CENTERS"]),
        ],
    },
    DefaultCategory {
        name: "Home",
        icon: "🏠",
        color: "#a855f7",
        plaid_categories: &["HOME_IMPROVEMENT"],
        children: &[
            ("Furnishings", &["HOME_IMPROVEMENT_FURNITURE"]),
            ("Home Supplies", &["HOME_IMPROVEMENT_HARDWARE"]),
        ],
    },
    DefaultCategory {
        name: "Loans",
        icon: "💰",
        color: "#78716c",
        plaid_categories: &["LOAN_PAYMENTS"],
        children: &[
            ("Auto Payment", &["LOAN_PAYMENTS_CAR_PAYMENT"]),
            ("Mortgage", &["LOAN_PAYMENTS_MORTGAGE_PAYMENT"]),
            ("Student Loan", &["LOAN_PAYMENTS_STUDENT_LOAN_PAYMENT"]),
        ],
    },
    DefaultCategory {
        name: "Personal Care",
        icon: "💇",
        color: "#fb923c",
        plaid_categories: &["PERSONAL_CARE"],
        children: &[
            ("Hair", &["PERSONAL_CARE_HAIR_AND_BEAUTY"]),
            ("Laundry", &["PERSONAL_CARE_LAUNDRY_AND_DRY_CLEANING"]),
        ],
    },
    DefaultCategory {
        name: "Shopping",
        icon: "🛍️",
        color: "#0ea5e9",
        plaid_categories: &["GENERAL_MERCHANDISE"],
        children: &[
            ("Clothing", &["GENERAL_MERCHANDISE_CLOTHING_AND_ACCESSORIES"]),
            ("Electronics", &["GENERAL_MERCHANDISE_ELECTRONICS"]),
            ("Gifts", &["GENERAL_MERCHANDISE_GIFTS_AND_NOVELTIES"]),
            ("Pet Supplies", &["GENERAL_MERCHANDISE_PET_SUPPLIES"]),
        ],
    },
    DefaultCategory {
        name: "Taxes",
        icon: "🏛️",
        color: "#475569",
        plaid_categories: &["GOVERNMENT_AND_NON_PROFIT_TAX_PAYMENT"],
        children: &[],
    },
    DefaultCategory {
        name: "Travel",
        icon: "✈️",
        color: "#6366f1",
        plaid_categories: &["TRAVEL"],
        children: &[
            ("Airline", &["TRAVEL_FLIGHTS"]),
            ("Hotel", &["TRAVEL_LODGING"]),
            ("Rental Car", &["TRAVEL_RENTAL_CARS"]),
        ],
    },
    DefaultCategory {
        name: "Income",
        icon: "💵",
        color: "#10b981",
        plaid_categories: &["INCOME"],
        children: &[
            ("Paycheck", &["INCOME_WAGES"]),
            ("Dividend Income", &["INCOME_DIVIDENDS"]),
            ("Interest Earned", &["INCOME_INTEREST_EARNED"]),
            ("Tax Refund", &["INCOME_TAX_REFUND"]),
        ],
    },
];

fn insert_if_missing(
    name: &str,
    parent_id: Option<CategoryId>,
    icon: &str,
    color: &str,
    plaid_categories: &[&str],
    connection: &Connection,
) -> Result<(CategoryId, bool), Error> {
    let existing: Option<CategoryId> = connection
        .query_row(
            "SELECT id FROM spending_category WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok((id, false));
    }

    connection.execute(
        "INSERT INTO spending_category (name, parent_id, icon, color, plaid_categories, \
            created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            name,
            parent_id,
            icon,
            color,
            to_json_text(&plaid_categories)?,
            OffsetDateTime::now_utc(),
        ],
    )?;

    Ok((connection.last_insert_rowid(), true))
}

/// Create the default category set, skipping any category whose name already
/// exists. Returns the number of categories created.
pub fn seed_default_categories(connection: &Connection) -> Result<usize, Error> {
    let transaction = connection.unchecked_transaction()?;
    let mut created = 0;

    for parent in DEFAULT_CATEGORIES {
        let (parent_id, parent_created) = insert_if_missing(
            parent.name,
            None,
            parent.icon,
            parent.color,
            parent.plaid_categories,
            &transaction,
        )?;
        created += usize::from(parent_created);

        for (name, plaid_categories) in parent.children {
            let (_, child_created) = insert_if_missing(
                name,
                Some(parent_id),
                parent.icon,
                parent.color,
                plaid_categories,
                &transaction,
            )?;
            created += usize::from(child_created);
        }
    }

    transaction.commit()?;

    Ok(created)
}
