//! Payment Gating
//!
//! The three payment schemes a tool can advertise, the gate marker embedded
//! into a tool's rendered description, and the extractor that parses the
//! marker back out of free text. Adding a scheme extends the enum and every
//! match below fails to compile until it handles the new arm.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a gated tool is paid for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PaymentDetails {
    TokenGated {
        chain: String,
        token_address: String,
        amount_ui: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Subscription {
        plan_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Credit {
        amount: f64,
        credit_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl PaymentDetails {
    /// The machine-readable marker appended to a gated tool's description.
    pub fn gate_marker(&self) -> String {
        match self {
            PaymentDetails::TokenGated {
                chain,
                token_address,
                amount_ui,
                ..
            } => format!(
                "[gate scheme=token-gated chain={} token={} amount={}]",
                chain, token_address, amount_ui
            ),
            PaymentDetails::Subscription { plan_id, .. } => {
                format!("[gate scheme=subscription plan={}]", plan_id)
            }
            PaymentDetails::Credit {
                amount, credit_id, ..
            } => format!("[gate scheme=credit amount={} id={}]", amount, credit_id),
        }
    }

    /// The human-readable sentence for this gate. A free-text `description`
    /// on the scheme overrides the generated wording.
    pub fn sentence(&self) -> String {
        let custom = match self {
            PaymentDetails::TokenGated { description, .. } => description,
            PaymentDetails::Subscription { description, .. } => description,
            PaymentDetails::Credit { description, .. } => description,
        };
        if let Some(text) = custom {
            return text.clone();
        }

        match self {
            PaymentDetails::TokenGated {
                chain,
                token_address,
                amount_ui,
                ..
            } => format!(
                "Requires holding {} of token {} on {}.",
                amount_ui, token_address, chain
            ),
            PaymentDetails::Subscription { plan_id, .. } => {
                format!("Requires an active subscription to plan {}.", plan_id)
            }
            PaymentDetails::Credit {
                amount, credit_id, ..
            } => format!("Costs {} credits ({}).", amount, credit_id),
        }
    }
}

/// Render the description a gated tool advertises: the tool's own
/// description, the gate sentence, and the machine-readable marker.
pub fn gated_description(base: &str, details: &PaymentDetails) -> String {
    format!("{} ({}) {}", base, details.sentence(), details.gate_marker())
}

/// Parse a gate marker back out of a rendered description.
///
/// Returns `None` when no marker is present or the scheme is unknown; a
/// registry treats such tools as free.
pub fn extract_gate(description: &str) -> Option<PaymentDetails> {
    let marker = Regex::new(r"\[gate scheme=([a-z-]+)((?: [a-z]+=[^ \]]+)*)\]").ok()?;
    let captures = marker.captures(description)?;
    let scheme = captures.get(1)?.as_str();

    let mut params = std::collections::HashMap::new();
    for pair in captures.get(2)?.as_str().split_whitespace() {
        if let Some((key, value)) = pair.split_once('=') {
            params.insert(key.to_string(), value.to_string());
        }
    }

    match scheme {
        "token-gated" => Some(PaymentDetails::TokenGated {
            chain: params.get("chain")?.clone(),
            token_address: params.get("token")?.clone(),
            amount_ui: params.get("amount")?.parse().ok()?,
            description: None,
        }),
        "subscription" => Some(PaymentDetails::Subscription {
            plan_id: params.get("plan")?.clone(),
            description: None,
        }),
        "credit" => Some(PaymentDetails::Credit {
            amount: params.get("amount")?.parse().ok()?,
            credit_id: params.get("id")?.clone(),
            description: None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_gate_roundtrip() {
        let details = PaymentDetails::TokenGated {
            chain: "solana".to_string(),
            token_address: "So11111111111111111111111111111111111111112".to_string(),
            amount_ui: 1.5,
            description: None,
        };
        let rendered = gated_description("Echoes input", &details);
        assert!(rendered.contains("Echoes input"));
        assert!(rendered.contains("scheme=token-gated"));

        let extracted = extract_gate(&rendered).unwrap();
        assert_eq!(extracted, details);
    }

    #[test]
    fn test_subscription_and_credit_roundtrip() {
        let sub = PaymentDetails::Subscription {
            plan_id: "pro-monthly".to_string(),
            description: None,
        };
        assert_eq!(extract_gate(&gated_description("x", &sub)).unwrap(), sub);

        let credit = PaymentDetails::Credit {
            amount: 5.0,
            credit_id: "cr-123".to_string(),
            description: None,
        };
        assert_eq!(
            extract_gate(&gated_description("x", &credit)).unwrap(),
            credit
        );
    }

    #[test]
    fn test_description_override_keeps_marker() {
        let details = PaymentDetails::Subscription {
            plan_id: "pro".to_string(),
            description: Some("Subscribers only.".to_string()),
        };
        let rendered = gated_description("Market data", &details);
        assert!(rendered.contains("Subscribers only."));
        assert!(extract_gate(&rendered).is_some());
    }

    #[test]
    fn test_free_description_has_no_gate() {
        assert!(extract_gate("Echoes input back to the caller").is_none());
    }

    #[test]
    fn test_serde_tag_shape() {
        let details = PaymentDetails::Credit {
            amount: 2.0,
            credit_id: "cr-9".to_string(),
            description: None,
        };
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["type"], "credit");
        assert_eq!(value["creditId"], "cr-9");
    }
}
