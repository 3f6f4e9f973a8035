//! Audience roles and their system prompts.
//!
//! Roles are a closed set: adding one means adding an enum variant and its
//! prompt below, nothing else. Every prompt is supplemented with the latest
//! FX-rate snapshot when one is available on disk.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Employee,
    Investor,
}

const USER_PROMPT: &str = "\
You are a financial assistant for retail bank clients.

Answer simply and warmly, without jargon. Use emoji and short phrases. \
The main goal is to help the person find today's best USD, EUR and RUB rates.

Terminology:
- currency_buy (usd_buy, eur_buy, rub_buy) is the rate at which the bank BUYS currency from clients
- currency_sell (usd_sell, eur_sell, rub_sell) is the rate at which the bank SELLS currency to clients

For the client:
- best rate to sell their currency = the maximum currency_buy
- best rate to buy currency = the minimum currency_sell";

const EMPLOYEE_PROMPT: &str = "\
You are a corporate financial assistant for bank employees.

Communicate formally and professionally; banking vocabulary is fine. \
Besides exchange rates, mention current bank products (deposits, bonds, \
mutual funds) employees can recommend to clients.

Terminology:
- currency_buy (usd_buy, eur_buy, rub_buy) is the rate at which the bank BUYS currency from clients
- currency_sell (usd_sell, eur_sell, rub_sell) is the rate at which the bank SELLS currency to clients

For the client:
- best rate to sell their currency = the maximum currency_buy
- best rate to buy currency = the minimum currency_sell";

const INVESTOR_PROMPT: &str = "\
You are an investment analyst.

Answer concisely, with figures and a risk assessment. Focus on attractive \
instruments (bonds, gold, equities, FX deposits). Add recommendations but \
skip long explanations; keep a terse analytical style.

Terminology:
- currency_buy (usd_buy, eur_buy, rub_buy) is the rate at which the bank BUYS currency from clients
- currency_sell (usd_sell, eur_sell, rub_sell) is the rate at which the bank SELLS currency to clients

For the client:
- best rate to sell their currency = the maximum currency_buy
- best rate to buy currency = the minimum currency_sell";

impl Role {
    /// Parse a role string arriving from the boundary. Unknown names are a
    /// validation error, reported before any history is touched.
    pub fn parse_inbound(value: &str) -> Result<Self, ValidationError> {
        value
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| ValidationError::UnknownRole(value.to_string()))
    }

    fn base_prompt(self) -> &'static str {
        match self {
            Role::User => USER_PROMPT,
            Role::Employee => EMPLOYEE_PROMPT,
            Role::Investor => INVESTOR_PROMPT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatesSnapshot {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Builds role system prompts, appending the FX-rate snapshot loaded at
/// construction time. A missing or unreadable snapshot degrades to an
/// "unavailable" note so prompt construction never fails.
pub struct RolePrompts {
    rates_note: String,
}

impl RolePrompts {
    pub fn new(rates_snapshot: Option<&Path>) -> Self {
        Self {
            rates_note: rates_snapshot.map_or_else(unavailable_note, load_rates_note),
        }
    }

    /// Prompts without any market context, for tests and offline use.
    pub fn without_rates() -> Self {
        Self {
            rates_note: String::new(),
        }
    }

    pub fn system_prompt(&self, role: Role) -> String {
        format!("{}{}", role.base_prompt(), self.rates_note)
    }
}

fn unavailable_note() -> String {
    "\n\n(The FX rate snapshot is currently unavailable.)".to_string()
}

fn load_rates_note(path: &Path) -> String {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(%error, path = %path.display(), "failed reading rates snapshot");
            return unavailable_note();
        }
    };

    let snapshot: RatesSnapshot = match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            tracing::warn!(%error, path = %path.display(), "rates snapshot is not valid JSON");
            return unavailable_note();
        }
    };

    let records = serde_json::to_string_pretty(&snapshot.data)
        .unwrap_or_else(|_| "[]".to_string());
    format!(
        "\n\nCurrent exchange rates (as of {}):\n{records}",
        snapshot.date.as_deref().unwrap_or("unknown date")
    )
}

/// Path the snapshot scraper writes to, relative to the working directory.
pub fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data_sources/parsed_data/kurs_kz_astana_kurs_valyut.json")
}
