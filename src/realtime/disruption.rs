use crate::shared::Time;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

/// GTFS-RT style effect of a disruption, ordered from most to least serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Effect {
    NoService,
    ReducedService,
    SignificantDelays,
    Detour,
    AdditionalService,
    ModifiedService,
    OtherEffect,
    UnknownEffect,
    StopMoved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Severity {
    pub uri: String,
    pub wording: String,
    pub effect: Effect,
    pub color: String,
    pub priority: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Web,
    Mobile,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_types: Vec<ChannelType>,
}

impl Message {
    /// The realtime feed publishes on a single hardcoded channel.
    pub fn realtime(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            channel_id: "rt".into(),
            channel_name: "rt".into(),
            channel_types: vec![ChannelType::Web, ChannelType::Mobile],
        }
    }
}

/// A stop time amended by a disruption, resolved against the dataset.
#[derive(Debug, Clone)]
pub struct AmendedStopTime {
    pub stop_point_idx: u32,
    pub arrival_time: Time,
    pub departure_time: Time,
    pub pick_up_allowed: bool,
    pub drop_off_allowed: bool,
}

#[derive(Debug, Clone)]
pub struct StopTimeUpdate {
    pub stop_time: AmendedStopTime,
    pub message: Option<String>,
}

/// What a disruption impact applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InformedEntity {
    MetaVehicleJourney(u32),
    Line(u32),
    StopPoint(u32),
    StopArea(u32),
}

#[derive(Debug, Clone)]
pub struct Impact {
    pub uri: String,
    pub application_periods: Vec<(NaiveDateTime, NaiveDateTime)>,
    pub severity: Arc<Severity>,
    pub messages: Vec<Message>,
    pub informed_entities: Vec<InformedEntity>,
    pub amended_stop_times: Vec<StopTimeUpdate>,
}

#[derive(Debug, Clone)]
pub struct Disruption {
    pub uri: String,
    pub reference: String,
    pub publication_period: (NaiveDateTime, NaiveDateTime),
    pub cause: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub impacts: Vec<Arc<Impact>>,
}

impl Disruption {
    /// Worst effect across the disruption's impacts.
    pub fn most_serious_effect(&self) -> Option<Effect> {
        self.impacts.iter().map(|impact| impact.severity.effect).min()
    }
}

/// Registry of live disruptions plus the interning table for severities.
///
/// Severities are shared by id through weak references: the first creator
/// seeds the entry, later identical severities reuse the live instance, and
/// an id whose every user is gone can be recreated.
#[derive(Debug, Clone, Default)]
pub struct DisruptionHolder {
    disruptions: HashMap<String, Disruption>,
    severities: HashMap<String, Weak<Severity>>,
}

impl DisruptionHolder {
    pub fn get(&self, uri: &str) -> Option<&Disruption> {
        self.disruptions.get(uri)
    }

    pub fn insert(&mut self, disruption: Disruption) {
        self.disruptions.insert(disruption.uri.clone(), disruption);
    }

    pub fn remove(&mut self, uri: &str) -> Option<Disruption> {
        self.disruptions.remove(uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Disruption> {
        self.disruptions.values()
    }

    pub fn len(&self) -> usize {
        self.disruptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disruptions.is_empty()
    }

    pub fn make_severity(
        &mut self,
        id: &str,
        wording: &str,
        effect: Effect,
        timestamp: NaiveDateTime,
    ) -> Arc<Severity> {
        if let Some(weak) = self.severities.get(id)
            && let Some(severity) = weak.upgrade()
        {
            return severity;
        }
        let severity = Arc::new(Severity {
            uri: id.to_string(),
            wording: wording.to_string(),
            effect,
            color: "#000000".into(),
            priority: 42,
            created_at: timestamp,
        });
        self.severities.insert(id.to_string(), Arc::downgrade(&severity));
        severity
    }

    /// Impacts informing a given entity, across all live disruptions.
    pub fn impacts_on(&self, entity: &InformedEntity) -> impl Iterator<Item = &Arc<Impact>> {
        self.disruptions.values().flat_map(move |disruption| {
            disruption
                .impacts
                .iter()
                .filter(move |impact| impact.informed_entities.contains(entity))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamp() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2015, 3, 14)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn severities_are_interned_by_id() {
        let mut holder = DisruptionHolder::default();
        let a = holder.make_severity("sev:1", "trip canceled", Effect::NoService, timestamp());
        let b = holder.make_severity("sev:1", "other wording", Effect::SignificantDelays, timestamp());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.wording, "trip canceled");
    }

    #[test]
    fn dead_severity_is_recreated() {
        let mut holder = DisruptionHolder::default();
        let a = holder.make_severity("sev:1", "trip canceled", Effect::NoService, timestamp());
        drop(a);
        let b = holder.make_severity("sev:1", "trip delayed", Effect::SignificantDelays, timestamp());
        assert_eq!(b.wording, "trip delayed");
    }

    #[test]
    fn effect_ordering() {
        assert!(Effect::NoService < Effect::SignificantDelays);
        assert!(Effect::SignificantDelays < Effect::UnknownEffect);
    }
}
