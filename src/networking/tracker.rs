use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::util::meter::ContinuousMeter;
use crate::validators;
use crate::zfx_id::{Id, NodeId};

/// Idle nodes are forgotten once their usage decays below this.
const PRUNE_THRESHOLD: f64 = 0.001;
/// Half-lives between two sweeps for idle nodes.
const PRUNE_HALF_LIVES: u32 = 10;

struct Meters {
    per_node: HashMap<NodeId, ContinuousMeter>,
    total: ContinuousMeter,
    last_prune: Instant,
}

impl Meters {
    fn prune(&mut self, now: Instant, epsilon: f64) {
        self.per_node.retain(|_, m| m.active() > 0.0 || m.read(now) >= epsilon);
        self.last_prune = now;
    }
}

/// How busy each node keeps us: the smoothed number of its messages being processed.
pub struct ResourceTracker {
    half_life: Duration,
    meters: Mutex<Meters>,
}

impl ResourceTracker {
    pub fn new(half_life: Duration) -> Self {
        let now = Instant::now();
        ResourceTracker {
            half_life,
            meters: Mutex::new(Meters {
                per_node: HashMap::new(),
                total: ContinuousMeter::new(half_life, now),
                last_prune: now,
            }),
        }
    }

    pub fn start_processing(&self, node_id: NodeId, now: Instant) {
        let mut meters = self.meters.lock().unwrap_or_else(PoisonError::into_inner);
        let half_life = self.half_life;
        meters.per_node.entry(node_id).or_insert_with(|| ContinuousMeter::new(half_life, now)).inc(now, 1.0);
        meters.total.inc(now, 1.0);
    }

    pub fn stop_processing(&self, node_id: NodeId, now: Instant) {
        let mut meters = self.meters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(meter) = meters.per_node.get_mut(&node_id) {
            meter.dec(now, 1.0);
        }
        meters.total.dec(now, 1.0);
        if now.saturating_duration_since(meters.last_prune) >= self.half_life * PRUNE_HALF_LIVES {
            meters.prune(now, PRUNE_THRESHOLD);
        }
    }

    pub fn usage(&self, node_id: &NodeId, now: Instant) -> f64 {
        let meters = self.meters.lock().unwrap_or_else(PoisonError::into_inner);
        meters.per_node.get(node_id).map(|m| m.read(now)).unwrap_or(0.0)
    }

    pub fn total_usage(&self, now: Instant) -> f64 {
        self.meters.lock().unwrap_or_else(PoisonError::into_inner).total.read(now)
    }

    /// How long until the usage of `node_id` drops to `value` if nothing else is processed.
    /// `None` if it never will.
    pub fn time_until_usage(&self, node_id: &NodeId, now: Instant, value: f64) -> Option<Duration> {
        let meters = self.meters.lock().unwrap_or_else(PoisonError::into_inner);
        match meters.per_node.get(node_id) {
            Some(meter) => meter.time_until(now, value),
            None => Some(Duration::from_secs(0)),
        }
    }

    /// Forgets idle nodes whose usage has decayed below `epsilon`. Also done every few
    /// half-lives as processing stops.
    pub fn prune(&self, now: Instant, epsilon: f64) {
        self.meters.lock().unwrap_or_else(PoisonError::into_inner).prune(now, epsilon);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargeterConfig {
    /// Usage shared among validators in proportion to their stake.
    pub validator_alloc: f64,
    /// Usage available to anyone, validator or not.
    pub max_non_validator_usage: f64,
    /// Cap on the at-large share of a single node.
    pub max_non_validator_node_usage: f64,
}

impl Default for TargeterConfig {
    fn default() -> Self {
        TargeterConfig { validator_alloc: 10.0, max_non_validator_usage: 6.0, max_non_validator_node_usage: 2.0 }
    }
}

/// Decides how much usage a node is entitled to.
pub struct Targeter {
    config: TargeterConfig,
    validators: Arc<validators::Manager>,
    allychain_id: Id,
    tracker: Arc<ResourceTracker>,
}

impl Targeter {
    pub fn new(
        config: TargeterConfig,
        validators: Arc<validators::Manager>,
        allychain_id: Id,
        tracker: Arc<ResourceTracker>,
    ) -> Self {
        Targeter { config, validators, allychain_id, tracker }
    }

    pub fn target_usage(&self, node_id: &NodeId, now: Instant) -> f64 {
        let at_large = (self.config.max_non_validator_usage - self.tracker.total_usage(now)).max(0.0);
        let at_large = at_large.min(self.config.max_non_validator_node_usage);

        let validator_share = match self.validators.get_validators(&self.allychain_id) {
            Some(vdrs) => {
                let (weight, total) = (vdrs.get_weight(node_id), vdrs.weight());
                if weight == 0 || total == 0 {
                    0.0
                } else {
                    self.config.validator_alloc * weight as f64 / total as f64
                }
            }
            None => 0.0,
        };
        at_large + validator_share
    }
}
