//! Storage node identity, attributes, and lifecycle state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known attribute holding a node's storage price as a decimal
/// unsigned integer.
pub const ATTR_PRICE: &str = "Price";

/// Well-known attribute holding a node's storage capacity as a decimal
/// unsigned integer.
pub const ATTR_CAPACITY: &str = "Capacity";

/// Attribute key prefix declaring subnet membership, e.g. `Subnet:12`.
const ATTR_SUBNET_PREFIX: &str = "Subnet:";

/// Errors raised while ingesting node attributes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttributeError {
    /// Attribute keys must be non-empty.
    #[error("empty attribute key")]
    EmptyKey,

    /// A well-known numeric attribute does not parse as an unsigned
    /// 64-bit integer.
    #[error("invalid numeric value for '{key}': '{value}'")]
    InvalidNumeric {
        /// The offending attribute key.
        key: String,
        /// The value that failed to parse.
        value: String,
    },
}

/// Lifecycle state of a storage node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// State is not known.
    #[default]
    Unspecified,
    /// Node is registered and serving requests.
    Online,
    /// Node has left the network.
    Offline,
    /// Node is temporarily unavailable for new data.
    Maintenance,
}

/// Insertion-ordered, unique-key attribute list.
///
/// Attribute counts are small (typically well under twenty), so an ordered
/// association list beats a hash map here: lookups stay cheap and the
/// serialization order is stable without a separate sort step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// Creates an empty attribute list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, replacing the value in place if the key already
    /// exists so insertion order is preserved.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no attributes are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One storage node: identity, declared attributes, endpoints, and state.
///
/// The node's identity hash for rendezvous ordering is derived from its
/// public key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    state: NodeState,
    public_key: Vec<u8>,
    endpoints: Vec<String>,
    attributes: Attributes,
}

impl NodeInfo {
    /// Creates a node with the given public key.
    #[must_use]
    pub fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self { public_key: public_key.into(), ..Self::default() }
    }

    /// Sets the lifecycle state.
    #[must_use]
    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    /// Appends a network endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    /// Sets an attribute.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty key, or when a well-known numeric
    /// attribute (`Price`, `Capacity`) does not parse as an unsigned 64-bit
    /// integer. Numeric validation happens here, at ingestion, never during
    /// placement resolution.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), AttributeError> {
        let key = key.into();
        let value = value.into();
        if key.is_empty() {
            return Err(AttributeError::EmptyKey);
        }
        if (key == ATTR_PRICE || key == ATTR_CAPACITY) && value.parse::<u64>().is_err() {
            return Err(AttributeError::InvalidNumeric { key, value });
        }
        self.attributes.set(key, value);
        Ok(())
    }

    /// Returns the value of an attribute, if set.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Returns the node's public key.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Returns the node's network endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Returns the declared storage price, or 0 when unset.
    #[must_use]
    pub fn price(&self) -> u64 {
        self.numeric_attribute(ATTR_PRICE)
    }

    /// Returns the declared storage capacity, or 0 when unset.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.numeric_attribute(ATTR_CAPACITY)
    }

    fn numeric_attribute(&self, key: &str) -> u64 {
        self.attributes.get(key).and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    /// Returns whether the node is a member of the given subnet.
    ///
    /// Membership is declared via `Subnet:<id>` attributes with a `True` or
    /// `False` value. Subnet 0 is the default: every node belongs to it
    /// unless it explicitly opts out.
    #[must_use]
    pub fn belongs_to_subnet(&self, id: u32) -> bool {
        match self.attributes.get(&format!("{ATTR_SUBNET_PREFIX}{id}")) {
            Some(v) => v == "True",
            None => id == 0,
        }
    }
}

impl quay_hrw::HrwKey for NodeInfo {
    fn hrw_key(&self) -> u64 {
        quay_hrw::hash(&self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_hrw::HrwKey;

    #[test]
    fn test_attributes_preserve_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.set("Country", "Russia");
        attrs.set("City", "Moscow");
        attrs.set("Rating", "5");

        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Country", "City", "Rating"]);
    }

    #[test]
    fn test_attributes_replace_in_place() {
        let mut attrs = Attributes::new();
        attrs.set("Country", "Russia");
        attrs.set("City", "Moscow");
        attrs.set("Country", "Germany");

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("Country"), Some("Germany"));
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Country", "City"]);
    }

    #[test]
    fn test_numeric_attribute_validated_at_ingestion() {
        let mut node = NodeInfo::new(*b"key");
        assert!(node.set_attribute("Price", "15").is_ok());
        assert_eq!(
            node.set_attribute("Capacity", "lots"),
            Err(AttributeError::InvalidNumeric {
                key: "Capacity".to_string(),
                value: "lots".to_string(),
            })
        );
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut node = NodeInfo::new(*b"key");
        assert_eq!(node.set_attribute("", "x"), Err(AttributeError::EmptyKey));
    }

    #[test]
    fn test_price_capacity_accessors() {
        let mut node = NodeInfo::new(*b"key");
        node.set_attribute("Price", "15").unwrap();
        node.set_attribute("Capacity", "2000").unwrap();

        assert_eq!(node.price(), 15);
        assert_eq!(node.capacity(), 2000);

        let bare = NodeInfo::new(*b"other");
        assert_eq!(bare.price(), 0);
        assert_eq!(bare.capacity(), 0);
    }

    #[test]
    fn test_subnet_membership() {
        let mut node = NodeInfo::new(*b"key");

        // Subnet 0 is implicit, any other requires an explicit entry.
        assert!(node.belongs_to_subnet(0));
        assert!(!node.belongs_to_subnet(7));

        node.set_attribute("Subnet:7", "True").unwrap();
        assert!(node.belongs_to_subnet(7));

        node.set_attribute("Subnet:0", "False").unwrap();
        assert!(!node.belongs_to_subnet(0));
    }

    #[test]
    fn test_hrw_key_derived_from_public_key() {
        let a = NodeInfo::new(*b"alpha");
        let b = NodeInfo::new(*b"beta");
        assert_eq!(a.hrw_key(), NodeInfo::new(*b"alpha").hrw_key());
        assert_ne!(a.hrw_key(), b.hrw_key());
    }
}
