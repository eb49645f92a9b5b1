use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use colored::Colorize;
use tracing::info;

use crate::util::Latch;
use crate::zfx_id::Id;

/// Bootstrap progress of the chains of one allychain.
///
/// The allychain is bootstrapped once none of its chains is still bootstrapping. The
/// completion signal fires the moment the set of bootstrapping chains becomes empty and never
/// fires again: adding a chain afterwards makes `is_bootstrapped` false but does not re-arm it.
#[derive(Debug)]
pub struct Allychain {
    id: Id,
    bootstrapping: RwLock<HashSet<Id>>,
    bootstrapped: Latch,
}

impl Allychain {
    pub fn new(id: Id) -> Self {
        Allychain { id, bootstrapping: RwLock::new(HashSet::new()), bootstrapped: Latch::new() }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Registers a chain that has started bootstrapping. Returns `false` if it was already
    /// registered.
    pub fn add_chain(&self, chain_id: Id) -> bool {
        self.bootstrapping.write().unwrap_or_else(PoisonError::into_inner).insert(chain_id)
    }

    /// Forgets a chain without marking it bootstrapped. Removing the last bootstrapping chain
    /// completes the allychain.
    pub fn remove_chain(&self, chain_id: &Id) {
        self.stop_tracking(chain_id);
    }

    /// Marks `chain_id` as bootstrapped.
    pub fn bootstrapped(&self, chain_id: &Id) {
        self.stop_tracking(chain_id);
    }

    fn stop_tracking(&self, chain_id: &Id) {
        let done = {
            let mut bootstrapping = self.bootstrapping.write().unwrap_or_else(PoisonError::into_inner);
            bootstrapping.remove(chain_id);
            bootstrapping.is_empty()
        };
        if done && self.bootstrapped.fire() {
            info!("[{}] allychain {} finished bootstrapping", "allychain".green(), self.id);
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapping.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    /// Signal fired when the allychain first becomes bootstrapped.
    pub fn after_bootstrapped(&self) -> &Latch {
        &self.bootstrapped
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[actix_rt::test]
    async fn test_signal_fires_once_all_chains_bootstrapped() {
        let allychain = Arc::new(Allychain::new(Id::one()));
        let (x, y) = (Id::new(b"x"), Id::new(b"y"));
        assert!(allychain.add_chain(x));
        assert!(allychain.add_chain(y));
        assert!(!allychain.add_chain(x));
        assert!(!allychain.is_bootstrapped());

        let waiter = {
            let allychain = allychain.clone();
            tokio::spawn(async move { allychain.after_bootstrapped().wait().await })
        };

        allychain.bootstrapped(&x);
        assert!(!allychain.is_bootstrapped());
        assert!(!allychain.after_bootstrapped().is_fired());

        allychain.bootstrapped(&y);
        assert!(allychain.is_bootstrapped());
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();

        // Bootstrapping the same chain again is harmless
        allychain.bootstrapped(&y);
        assert!(allychain.after_bootstrapped().is_fired());
    }

    #[test]
    fn test_latch_does_not_rearm() {
        let allychain = Allychain::new(Id::one());
        let x = Id::new(b"x");
        allychain.add_chain(x);
        allychain.bootstrapped(&x);
        assert!(allychain.after_bootstrapped().is_fired());

        let z = Id::new(b"z");
        allychain.add_chain(z);
        assert!(!allychain.is_bootstrapped());
        assert!(allychain.after_bootstrapped().is_fired());
        allychain.bootstrapped(&z);
        assert!(allychain.is_bootstrapped());
    }

    #[actix_rt::test]
    async fn test_removing_the_last_chain_fires_the_signal() {
        let allychain = Arc::new(Allychain::new(Id::one()));
        let (x, y) = (Id::new(b"x"), Id::new(b"y"));
        allychain.add_chain(x);
        allychain.add_chain(y);
        let waiter = {
            let allychain = allychain.clone();
            tokio::spawn(async move { allychain.after_bootstrapped().wait().await })
        };

        allychain.bootstrapped(&y);
        assert!(!allychain.is_bootstrapped());
        assert!(!allychain.after_bootstrapped().is_fired());

        allychain.remove_chain(&x);
        assert!(allychain.is_bootstrapped());
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();

        let other = Allychain::new(Id::two());
        other.add_chain(x);
        other.remove_chain(&x);
        assert!(other.is_bootstrapped());
        assert!(other.after_bootstrapped().is_fired());
    }
}
