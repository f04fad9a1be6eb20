//! Emergency-contact store

use crate::domain::error::{StoreError, StoreOpError, ValidationError};
use crate::domain::types::{new_id, Contact};
use crate::io::store::JsonStore;
use parking_lot::Mutex;
use std::path::Path;
use tracing::info;

const CONTACTS_FILE: &str = "contacts.json";

/// Returns true for `+` followed by 10-15 digits
fn is_valid_number(number: &str) -> bool {
    let Some(digits) = number.strip_prefix('+') else {
        return false;
    };
    (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

pub struct ContactStore {
    store: JsonStore,
    contacts: Mutex<Vec<Contact>>,
}

impl ContactStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let store = JsonStore::new(dir, CONTACTS_FILE);
        let contacts = store.load()?;
        Ok(Self { store, contacts: Mutex::new(contacts) })
    }

    pub fn add(&self, name: &str, number: &str) -> Result<Contact, StoreOpError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if !is_valid_number(number) {
            return Err(ValidationError::BadPhoneNumber.into());
        }

        let contact =
            Contact { id: new_id(), name: name.trim().to_string(), number: number.to_string() };

        let mut contacts = self.contacts.lock();
        contacts.push(contact.clone());
        self.store.persist(&contacts).map_err(StoreOpError::Storage)?;

        info!(contact_id = %contact.id, name = %contact.name, "contact_added");
        Ok(contact)
    }

    /// Remove by id; returns false if no such contact existed
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut contacts = self.contacts.lock();
        let before = contacts.len();
        contacts.retain(|c| c.id != id);
        if contacts.len() == before {
            return Ok(false);
        }
        self.store.persist(&contacts)?;
        info!(contact_id = %id, "contact_removed");
        Ok(true)
    }

    /// All contacts in insertion order
    pub fn list(&self) -> Vec<Contact> {
        self.contacts.lock().clone()
    }

    /// Recipient phone numbers in contact order
    pub fn numbers(&self) -> Vec<String> {
        self.contacts.lock().iter().map(|c| c.number.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.lock().is_empty()
    }
}
