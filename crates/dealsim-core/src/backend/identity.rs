//! Synthetic customer records for provisioning.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{json, Value};

const FIRST_NAMES: &[&str] = &[
    "Alex", "Jordan", "Taylor", "Morgan", "Casey", "Riley", "Avery", "Quinn", "Sam", "Dakota",
    "Blake", "Cameron", "Drew", "Emery", "Finley", "Hayden", "Jamie", "Kendall", "Logan",
    "Parker", "Reese", "Sage", "Skylar", "Tyler", "Chris", "Dana", "Jesse", "Kai", "Noah",
    "River", "Rowan",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Brown", "Davis", "Garcia", "Harris", "Jackson", "Johnson", "Jones", "Lee",
    "Martinez", "Miller", "Moore", "Robinson", "Smith", "Taylor", "Thomas", "Thompson", "Walker",
    "White", "Williams", "Wilson", "Wright", "Young", "Adams", "Baker", "Clark", "Collins", "Cook",
    "Cooper", "Evans", "Green", "Hall",
];

/// A customer record ready to be posted to the provisioning endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticCustomer {
    pub customer_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl SyntheticCustomer {
    /// Draw a new customer for `persona_id`. The id is `test-NNNNNN-TTTTTT`
    /// where `T` are the last six digits of `now` in epoch milliseconds.
    pub fn generate<R: Rng + ?Sized>(
        rng: &mut R,
        persona_id: &str,
        iteration: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let number: u32 = rng.gen_range(100_000..1_000_000);
        let stamp = now.timestamp_millis().rem_euclid(1_000_000);
        let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
        let suffix: u32 = rng.gen_range(0..1000);

        Self {
            customer_id: format!("test-{number}-{stamp:06}"),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{persona_id}-{iteration}-{suffix}@example.com"),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Body for `POST /customers/event`.
    pub fn event_body(&self, dealership_id: &str, now: DateTime<Utc>) -> Value {
        let dealer_id = dealership_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(dealership_id));

        json!({
            "dealer_id": dealer_id,
            "customer_id": self.customer_id,
            "timestamp": now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "customer": {
                "account_type": "Person",
                "customer_id": self.customer_id,
                "person": {
                    "first_name": self.first_name,
                    "last_name": self.last_name,
                    "communications": [{
                        "communication_type": "PrimaryEmail",
                        "email_address": self.email,
                    }],
                },
            },
        })
    }
}
