//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Internal identifier of a mandate row.
    MandateId
);
uuid_id!(
    /// Identifier of a subscription (one per mandate).
    SubscriptionId
);
uuid_id!(
    /// Identifier of a single invoice row.
    InvoiceId
);
uuid_id!(
    /// Identifier of a one-time program purchase.
    PurchaseId
);

macro_rules! text_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting blank input.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

text_id!(
    /// User identifier (owned by the auth subsystem).
    UserId,
    "user_id"
);
text_id!(
    /// Plan identifier in the plan catalog.
    PlanId,
    "plan_id"
);
text_id!(
    /// Program identifier used by other subsystems to grant access.
    ProductId,
    "product_id"
);
text_id!(
    /// Gateway-assigned mandate reference. Globally unique.
    ExternalRef,
    "external_ref"
);
text_id!(
    /// Gateway-assigned order identifier.
    OrderId,
    "order_id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandate_id_generates_unique_values() {
        let a = MandateId::new();
        let b = MandateId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn mandate_id_parses_from_string() {
        let id = MandateId::new();
        let parsed: MandateId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn subscription_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<SubscriptionId>().is_err());
    }

    #[test]
    fn purchase_id_serializes_as_plain_uuid() {
        let uuid = Uuid::new_v4();
        let id = PurchaseId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }

    #[test]
    fn user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
    }

    #[test]
    fn external_ref_keeps_value() {
        let r = ExternalRef::new("m1").unwrap();
        assert_eq!(r.as_str(), "m1");
        assert_eq!(r.to_string(), "m1");
    }

    #[test]
    fn empty_order_id_reports_field_name() {
        let err = OrderId::new("").unwrap_err();
        assert_eq!(err, ValidationError::empty_field("order_id"));
    }
}
