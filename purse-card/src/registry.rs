//! Identity-keyed card registry
//!
//! A host serving several cards keeps one [`PurseApplet`] per identity;
//! applets never share state.

use std::collections::HashMap;

use log::info;

use crate::card::CardIdentity;
use crate::error::CardError;
use crate::purse::PurseApplet;

#[derive(Default)]
pub struct CardRegistry {
    cards: HashMap<CardIdentity, PurseApplet>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provisioned applet under its identity
    pub fn insert(&mut self, applet: PurseApplet) -> Result<(), CardError> {
        let identity = applet.identity()?.clone();
        if self.cards.contains_key(&identity) {
            return Err(CardError::ConditionsNotSatisfied("identity already registered"));
        }
        info!("Registered card ({} bytes identity)", identity.as_bytes().len());
        self.cards.insert(identity, applet);
        Ok(())
    }

    pub fn get(&self, identity: &CardIdentity) -> Option<&PurseApplet> {
        self.cards.get(identity)
    }

    pub fn get_mut(&mut self, identity: &CardIdentity) -> Option<&mut PurseApplet> {
        self.cards.get_mut(identity)
    }

    pub fn remove(&mut self, identity: &CardIdentity) -> Option<PurseApplet> {
        self.cards.remove(identity)
    }

    /// End every card's session, as on a reader power-down
    pub fn reset_all(&mut self) {
        for applet in self.cards.values_mut() {
            applet.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
