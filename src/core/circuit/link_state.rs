use crate::core::connections::Link;
use crate::core::errors::{ShortCircuit, SimulationError};
use crate::core::types::{LinkId, Port};
use crate::core::values::{BitState, WireValue};
use indexmap::IndexMap;

/// Values seen by one participant of a link in one state
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PortStateInfo {
    pub(crate) last_pushed: WireValue,
    pub(crate) last_propagated: WireValue,
    pub(crate) last_received: WireValue,
}

impl PortStateInfo {
    fn floating(width: usize) -> Self {
        Self {
            last_pushed: WireValue::new(width),
            last_propagated: WireValue::new(width),
            last_received: WireValue::new(width),
        }
    }

    /// Info for a port that just left a link: it keeps driving what it
    /// pushed and has received nothing yet.
    fn carried(pushed: WireValue) -> Self {
        let width = pushed.width();
        Self {
            last_propagated: pushed.clone(),
            last_pushed: pushed,
            last_received: WireValue::new(width),
        }
    }
}

/// Per-state record of the values flowing over one link.
///
/// The cached merge result is dropped whenever a participant's propagated
/// value or the participant set changes.
#[derive(Debug, Clone)]
pub struct LinkState {
    link: LinkId,
    width: usize,
    participants: IndexMap<Port, PortStateInfo>,
    cache: Option<Result<WireValue, ShortCircuit>>,
}

// Widths inside a link state always agree; pushes are width-checked.
fn accumulate(acc: &mut WireValue, value: &WireValue) -> Result<(), ShortCircuit> {
    match acc.merge(value) {
        Ok(_) => Ok(()),
        Err(SimulationError::ShortCircuit(sc)) => Err(sc),
        Err(_) => Err(ShortCircuit::new(acc.clone(), value.clone())),
    }
}

impl LinkState {
    pub(crate) fn new(link: &Link) -> Self {
        Self {
            link: link.id(),
            width: link.width(),
            participants: link
                .participants()
                .map(|port| (port, PortStateInfo::floating(link.width())))
                .collect(),
            cache: None,
        }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn participants(&self) -> impl Iterator<Item = Port> + '_ {
        self.participants.keys().copied()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn contains(&self, port: Port) -> bool {
        self.participants.contains_key(&port)
    }

    pub fn last_pushed(&self, port: Port) -> Option<&WireValue> {
        self.participants.get(&port).map(|info| &info.last_pushed)
    }

    pub fn last_received(&self, port: Port) -> Option<&WireValue> {
        self.participants.get(&port).map(|info| &info.last_received)
    }

    pub(crate) fn last_propagated(&self, port: Port) -> Option<&WireValue> {
        self.participants.get(&port).map(|info| &info.last_propagated)
    }

    /// Record a pushed value. Returns whether it differs from the previous push.
    pub(crate) fn set_pushed(&mut self, port: Port, value: &WireValue) -> bool {
        let width = self.width;
        let info = self
            .participants
            .entry(port)
            .or_insert_with(|| PortStateInfo::floating(width));
        if info.last_pushed == *value {
            return false;
        }
        info.last_pushed = value.clone();
        true
    }

    /// Copy pushed values into the propagated snapshot
    pub(crate) fn refresh_propagated(&mut self) {
        let mut changed = false;
        for info in self.participants.values_mut() {
            if info.last_propagated != info.last_pushed {
                info.last_propagated = info.last_pushed.clone();
                changed = true;
            }
        }
        if changed {
            self.cache = None;
        }
    }

    /// Merge of every other participant's propagated value
    pub(crate) fn incoming_value(&self, port: Port) -> Result<WireValue, ShortCircuit> {
        let mut value = WireValue::new(self.width);
        for (other, info) in &self.participants {
            if *other != port {
                accumulate(&mut value, &info.last_propagated)?;
            }
        }
        Ok(value)
    }

    /// Recompute what each participant receives.
    ///
    /// Returns the ports whose received value changed, in port order, along
    /// with the last conflict hit while merging.
    pub(crate) fn collect_notifications(&mut self) -> (Vec<(Port, WireValue)>, Option<ShortCircuit>) {
        let mut notify = Vec::new();
        let mut short = None;

        let ports: Vec<Port> = self.participants.keys().copied().collect();
        for port in ports {
            let incoming = match self.incoming_value(port) {
                Ok(value) => value,
                Err(sc) => {
                    short = Some(sc.on_link(self.link));
                    continue;
                }
            };

            if let Some(info) = self.participants.get_mut(&port) {
                if info.last_received != incoming {
                    info.last_received = incoming.clone();
                    notify.push((port, incoming));
                }
            }
        }

        notify.sort_by_key(|(port, _)| *port);
        (notify, short)
    }

    /// Merge of every participant's propagated value, without touching the cache
    pub fn compute_merged(&self) -> Result<WireValue, ShortCircuit> {
        let mut value = WireValue::new(self.width);
        for info in self.participants.values() {
            accumulate(&mut value, &info.last_propagated).map_err(|sc| sc.on_link(self.link))?;
        }
        Ok(value)
    }

    /// Cached whole-link merge
    pub fn merged_value(&mut self) -> Result<WireValue, ShortCircuit> {
        if let Some(cached) = &self.cache {
            return cached.clone();
        }
        let merged = self.compute_merged();
        self.cache = Some(merged.clone());
        merged
    }

    pub fn is_short_circuited(&mut self) -> bool {
        self.merged_value().is_err()
    }

    /// Absorb another link state's participants.
    ///
    /// Every propagated value is reset to floating so the next propagation
    /// merges from scratch.
    pub(crate) fn absorb(&mut self, other: LinkState) {
        self.participants.extend(other.participants);
        for info in self.participants.values_mut() {
            info.last_propagated.set_all_bits(BitState::Floating);
        }
        self.cache = None;
    }

    /// Remove a participant, returning what it last pushed
    pub(crate) fn detach(&mut self, port: Port) -> Option<(WireValue, WireValue)> {
        let info = self.participants.shift_remove(&port)?;
        self.cache = None;
        Some((info.last_pushed, info.last_received))
    }

    /// Fresh link state for a port carved out of a larger link
    pub(crate) fn carved(link: &Link, port: Port, pushed: WireValue) -> Self {
        let mut participants = IndexMap::new();
        participants.insert(port, PortStateInfo::carried(pushed));
        Self {
            link: link.id(),
            width: link.width(),
            participants,
            cache: None,
        }
    }
}
