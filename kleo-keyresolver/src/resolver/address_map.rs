use kleo_keycache::{Key, Protocol};

/// Normalized address to keys, iterated in insertion order.
///
/// An address present with an empty key list is unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressKeyMap(Vec<(String, Vec<Key>)>);

impl AddressKeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.0.iter().any(|(addr, _)| addr == address)
    }

    pub fn get(&self, address: &str) -> Option<&Vec<Key>> {
        self.0
            .iter()
            .find_map(|(addr, keys)| (addr == address).then_some(keys))
    }

    pub fn get_mut(&mut self, address: &str) -> Option<&mut Vec<Key>> {
        self.0
            .iter_mut()
            .find_map(|(addr, keys)| (addr == address).then_some(keys))
    }

    /// Returns the key list of the address, appending an empty one if missing.
    pub fn entry(&mut self, address: &str) -> &mut Vec<Key> {
        let idx = match self.0.iter().position(|(addr, _)| addr == address) {
            Some(idx) => idx,
            None => {
                self.0.push((address.to_owned(), Vec::new()));
                self.0.len() - 1
            }
        };
        &mut self.0[idx].1
    }

    /// Replaces the key list of the address, keeping its position.
    pub fn insert(&mut self, address: &str, keys: Vec<Key>) {
        *self.entry(address) = keys;
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(addr, _)| addr.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Key])> {
        self.0.iter().map(|(addr, keys)| (addr.as_str(), keys.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Key>)> {
        self.0.iter_mut().map(|(addr, keys)| (addr.as_str(), keys))
    }

    /// Addresses whose key list is empty.
    pub fn unresolved(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, keys)| keys.is_empty())
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    /// Iterates over all keys of all addresses.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.iter().flat_map(|(_, keys)| keys.iter())
    }

    /// The protocol shared by all keys, `Unknown` if they mix or there are none.
    pub fn common_protocol(&self) -> Protocol {
        let mut protocols = self.keys().map(Key::protocol);
        match protocols.next() {
            Some(first) if protocols.all(|protocol| protocol == first) => first,
            _ => Protocol::Unknown,
        }
    }

    /// Empties every key list but keeps the addresses.
    pub fn clear_keys(&mut self) {
        for (_, keys) in &mut self.0 {
            keys.clear();
        }
    }
}

impl<'a> IntoIterator for &'a AddressKeyMap {
    type Item = (&'a str, &'a [Key]);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl FromIterator<(String, Vec<Key>)> for AddressKeyMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<Key>)>>(iter: T) -> Self {
        let mut map = AddressKeyMap::new();
        for (address, keys) in iter {
            map.insert(&address, keys);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kleo_keycache::{Capabilities, Validity};

    fn key(fpr: &str, protocol: Protocol) -> Key {
        Key::builder(protocol, fpr)
            .email("", "x@example.com", Validity::Full)
            .capabilities(Capabilities::ENCRYPT)
            .build()
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut map = AddressKeyMap::new();
        map.entry("zed@example.com");
        map.entry("amy@example.com");
        map.insert("zed@example.com", vec![key("aa", Protocol::OpenPGP)]);
        let addresses: Vec<_> = map.addresses().collect();
        assert_eq!(addresses, ["zed@example.com", "amy@example.com"]);
        assert_eq!(map.unresolved(), ["amy@example.com"]);
    }

    #[test]
    fn test_common_protocol() {
        let mut map = AddressKeyMap::new();
        assert_eq!(map.common_protocol(), Protocol::Unknown);
        map.insert("a@example.com", vec![key("aa", Protocol::CMS)]);
        assert_eq!(map.common_protocol(), Protocol::CMS);
        map.insert("b@example.com", vec![key("bb", Protocol::OpenPGP)]);
        assert_eq!(map.common_protocol(), Protocol::Unknown);
    }
}
