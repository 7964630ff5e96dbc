//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::UserId;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainError;

/// Catalog product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Human-readable order reference, also used as the gateway order id.
///
/// Format: `prefix + yymmddHHMMss + three random digits`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a new order number for the given instant.
    pub fn generate<R: Rng + ?Sized>(prefix: &str, now: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: u16 = rng.gen_range(0..1000);
        Self(format!("{prefix}{}{suffix:03}", now.format("%y%m%d%H%M%S")))
    }

    /// Wraps an existing order number.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique code of a fulfillment transaction, sent to the provider as the
/// order reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionCode(String);

impl TransactionCode {
    /// Generates a new transaction code for the given instant.
    pub fn generate<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> Self {
        let tail: String = rng
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        Self(format!("TRX{}{tail}", now.format("%y%m%d%H%M%S")))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is buying: a registered user or a guest identified by contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomerIdentity {
    Registered {
        user_id: UserId,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    Guest {
        email: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        phone: Option<String>,
    },
}

impl CustomerIdentity {
    /// Rebuilds an identity from its storage columns.
    pub fn from_columns(
        user_id: Option<UserId>,
        email: Option<String>,
        name: Option<String>,
        phone: Option<String>,
    ) -> Result<Self, DomainError> {
        match (user_id, email) {
            (Some(user_id), email) => Ok(CustomerIdentity::Registered {
                user_id,
                email,
                name,
            }),
            (None, Some(email)) => Ok(CustomerIdentity::Guest { email, name, phone }),
            (None, None) => Err(DomainError::InvalidCustomer(
                "either a user id or a guest email is required".to_string(),
            )),
        }
    }

    /// Checks that guest contact details are usable.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let CustomerIdentity::Guest { email, .. } = self
            && !email.contains('@')
        {
            return Err(DomainError::InvalidCustomer(format!(
                "guest email '{email}' is not an email address"
            )));
        }
        Ok(())
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CustomerIdentity::Registered { user_id, .. } => Some(*user_id),
            CustomerIdentity::Guest { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            CustomerIdentity::Registered { email, .. } => email.as_deref(),
            CustomerIdentity::Guest { email, .. } => Some(email),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            CustomerIdentity::Registered { name, .. } | CustomerIdentity::Guest { name, .. } => {
                name.as_deref()
            }
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            CustomerIdentity::Registered { .. } => None,
            CustomerIdentity::Guest { phone, .. } => phone.as_deref(),
        }
    }
}

/// Typed view of the game account identifiers stored as opaque JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameAccount {
    /// The player id in the game.
    pub user_id: String,
    /// Zone or server id, for games that shard players.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Display name confirmed by the provider's nickname lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl GameAccount {
    /// Creates an account view for a player id.
    pub fn new(user_id: impl Into<String>, server_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            server_id,
            username: None,
        }
    }

    /// Sets the confirmed display name.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Checks that the player id is present.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.user_id.trim().is_empty() {
            return Err(DomainError::InvalidGameData(
                "player id must not be empty".to_string(),
            ));
        }
        if let Some(server_id) = &self.server_id
            && server_id.trim().is_empty()
        {
            return Err(DomainError::InvalidGameData(
                "server id must not be blank when given".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts to the stored JSON map.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reads the typed view back from stored JSON.
    pub fn from_json(value: &Value) -> Result<Self, DomainError> {
        serde_json::from_value(value.clone())
            .map_err(|e| DomainError::InvalidGameData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let number = OrderNumber::generate("TU", now, &mut rng);

        assert!(number.as_str().starts_with("TU240309140507"));
        assert_eq!(number.as_str().len(), "TU".len() + 12 + 3);
        assert!(number.as_str()[14..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_transaction_code_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let code = TransactionCode::generate(now, &mut rng);

        assert!(code.as_str().starts_with("TRX240309140507"));
        assert_eq!(code.as_str().len(), 3 + 12 + 6);
        assert!(
            code.as_str()[15..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_customer_from_columns() {
        let user_id = UserId::new();
        let registered = CustomerIdentity::from_columns(Some(user_id), None, None, None).unwrap();
        assert_eq!(registered.user_id(), Some(user_id));

        let guest = CustomerIdentity::from_columns(
            None,
            Some("guest@example.com".to_string()),
            Some("Guest".to_string()),
            Some("0812".to_string()),
        )
        .unwrap();
        assert_eq!(guest.email(), Some("guest@example.com"));
        assert_eq!(guest.phone(), Some("0812"));

        assert!(CustomerIdentity::from_columns(None, None, None, None).is_err());
    }

    #[test]
    fn test_guest_email_validation() {
        let guest = CustomerIdentity::Guest {
            email: "nope".to_string(),
            name: None,
            phone: None,
        };
        assert!(matches!(
            guest.validate(),
            Err(DomainError::InvalidCustomer(_))
        ));
    }

    #[test]
    fn test_game_account_json_field_names() {
        let account = GameAccount::new("12345678", Some("2001".to_string())).with_username("Slayer");
        let json = account.to_json();
        assert_eq!(json["userId"], "12345678");
        assert_eq!(json["serverId"], "2001");
        assert_eq!(json["username"], "Slayer");
        assert_eq!(GameAccount::from_json(&json).unwrap(), account);
    }

    #[test]
    fn test_game_account_omits_missing_server() {
        let json = GameAccount::new("999", None).to_json();
        assert!(json.get("serverId").is_none());
    }

    #[test]
    fn test_game_account_validation() {
        assert!(GameAccount::new("  ", None).validate().is_err());
        assert!(GameAccount::new("1", Some(String::new())).validate().is_err());
        assert!(GameAccount::new("1", None).validate().is_ok());
        assert!(GameAccount::from_json(&serde_json::json!({"serverId": "1"})).is_err());
    }
}
