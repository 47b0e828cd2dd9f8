pub mod apply;
pub mod disruption;

use crate::{
    model::Dataset,
    realtime::disruption::{
        AmendedStopTime, Disruption, Effect, Impact, InformedEntity, Message, StopTimeUpdate,
    },
    shared::Time,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

#[derive(Error, Debug)]
pub enum Error {
    #[error("unhandled realtime message")]
    Unhandled,
    #[error("malformed stop times")]
    MalformedStopTimes,
    #[error("unknown vehicle journey: {0}")]
    UnknownTrip(String),
    #[error("unknown stop point: {0}")]
    UnknownStopPoint(String),
    #[error("invalid start date: {0}")]
    InvalidStartDate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleRelationship {
    Scheduled,
    Canceled,
    Added,
}

/// One arrival or departure field of a stop-time update. The instant is a
/// POSIX timestamp; `has_time` doubles as the public-access flag.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StopTimeEvent {
    pub has_time: bool,
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripStopTimeUpdate {
    pub stop_id: String,
    #[serde(default)]
    pub arrival: StopTimeEvent,
    #[serde(default)]
    pub departure: StopTimeEvent,
    #[serde(default)]
    pub message: Option<String>,
}

/// A realtime trip update, the engine's only ingestion input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripUpdate {
    /// Disruption key; a second update with the same id replaces the first.
    pub id: String,
    pub timestamp: NaiveDateTime,
    pub trip_id: String,
    /// Service date in undelimited form, `YYYYMMDD`.
    pub start_date: String,
    pub schedule_relationship: ScheduleRelationship,
    #[serde(default)]
    pub stop_time_updates: Vec<TripStopTimeUpdate>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TripUpdate {
    fn circulation_date(&self) -> Result<NaiveDate, Error> {
        NaiveDate::parse_from_str(&self.start_date, "%Y%m%d")
            .map_err(|_| Error::InvalidStartDate(self.start_date.clone()))
    }
}

fn start_of_day_posix(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp()
}

/// A field is meaningful when flagged present with a non-zero instant.
fn present(event: &StopTimeEvent) -> bool {
    event.has_time && event.time != 0
}

/// Repaired (arrival, departure) instants: a missing side is filled from
/// the other one.
fn effective_times(update: &TripStopTimeUpdate) -> (i64, i64) {
    let mut arrival = update.arrival.time;
    let mut departure = update.departure.time;
    if !present(&update.arrival) && present(&update.departure) {
        arrival = departure;
    }
    if !present(&update.departure) && present(&update.arrival) {
        departure = arrival;
    }
    (arrival, departure)
}

/// Whether this update is one the engine knows how to materialize.
///
/// Cancellations always are. Delay updates must carry stop times, none of
/// which may point before the start of the impacted day.
fn is_handleable(update: &TripUpdate) -> Result<bool, Error> {
    match update.schedule_relationship {
        ScheduleRelationship::Canceled => Ok(true),
        ScheduleRelationship::Scheduled if !update.stop_time_updates.is_empty() => {
            let day_start = start_of_day_posix(update.circulation_date()?);
            for stu in &update.stop_time_updates {
                let before_impact = (present(&stu.arrival) && stu.arrival.time < day_start)
                    || (present(&stu.departure) && stu.departure.time < day_start);
                if before_impact {
                    warn!(
                        trip = update.trip_id,
                        stop = stu.stop_id,
                        "stop time is before the day of impact"
                    );
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Ordering sanity of the raw update: departures never precede arrivals and
/// consecutive stops never go back in time.
fn check_trip_update(update: &TripUpdate) -> bool {
    if update.schedule_relationship != ScheduleRelationship::Scheduled
        || update.stop_time_updates.is_empty()
    {
        return true;
    }
    let mut last_departure: Option<i64> = None;
    for stu in &update.stop_time_updates {
        let (arrival, departure) = effective_times(stu);
        if let Some(last) = last_departure
            && last > arrival
        {
            warn!(trip = update.trip_id, stop = stu.stop_id, "stop time is not correctly ordered");
            return false;
        }
        if arrival > departure {
            warn!(
                trip = update.trip_id,
                stop = stu.stop_id,
                "departure is before the arrival"
            );
            return false;
        }
        last_departure = Some(departure);
    }
    true
}

/// Post-materialization validation of the amended stop times.
fn check_disruption(disruption: &Disruption) -> bool {
    for impact in &disruption.impacts {
        let mut last: Option<&AmendedStopTime> = None;
        for stu in &impact.amended_stop_times {
            let st = &stu.stop_time;
            if let Some(last) = last
                && last.departure_time > st.arrival_time
            {
                warn!(impact = impact.uri, "stop times are not correctly ordered");
                return false;
            }
            if st.departure_time < st.arrival_time {
                warn!(impact = impact.uri, "departure is before the arrival");
                return false;
            }
            last = Some(st);
        }
    }
    true
}

/// Execution window of the base journey on `date`, or the null period
/// `[midnight, midnight)` when nothing circulates that day.
fn base_execution_period(data: &Dataset, meta_vj_idx: u32, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    match data.base_vj_circulating_at(meta_vj_idx, date) {
        Some(vj) => data.execution_period(vj.idx, date),
        None => {
            let midnight = date.and_hms_opt(0, 0, 0).unwrap();
            (midnight, midnight)
        }
    }
}

fn create_disruption(data: &mut Dataset, update: &TripUpdate, meta_vj_idx: u32) -> Result<Disruption, Error> {
    debug!(id = update.id, "creating disruption");
    let circulation_date = update.circulation_date()?;
    let day_start = start_of_day_posix(circulation_date);

    // A previous update with the same key is superseded whole.
    apply::delete_disruption(data, &update.id);

    let production_period = (
        data.production_begin.and_hms_opt(0, 0, 0).unwrap(),
        data.production_end.and_hms_opt(0, 0, 0).unwrap(),
    );

    let (wording, effect) = match update.schedule_relationship {
        ScheduleRelationship::Canceled => {
            trace!("disruption has NO_SERVICE effect");
            ("trip canceled", Effect::NoService)
        }
        ScheduleRelationship::Scheduled => {
            trace!("disruption has SIGNIFICANT_DELAYS effect");
            ("trip delayed", Effect::SignificantDelays)
        }
        ScheduleRelationship::Added => {
            error!("unhandled realtime message");
            return Err(Error::Unhandled);
        }
    };

    let mut amended_stop_times = Vec::new();
    if update.schedule_relationship == ScheduleRelationship::Scheduled {
        for stu in &update.stop_time_updates {
            let Some(stop_point) = data.stop_point_by_uri(&stu.stop_id) else {
                warn!(
                    disruption = update.id,
                    stop = stu.stop_id,
                    "disruption cannot be handled, stop point not found"
                );
                return Err(Error::UnknownStopPoint(stu.stop_id.clone()));
            };
            let stop_point_idx = stop_point.idx;
            let (arrival, departure) = effective_times(stu);
            let arrival_time = Time::from_seconds((arrival - day_start).max(0) as u32);
            let departure_time = Time::from_seconds((departure - day_start).max(0) as u32);
            amended_stop_times.push(StopTimeUpdate {
                stop_time: AmendedStopTime {
                    stop_point_idx,
                    arrival_time,
                    departure_time,
                    pick_up_allowed: stu.departure.has_time,
                    drop_off_allowed: stu.arrival.has_time,
                },
                message: stu.message.clone(),
            });
        }
    }

    let severity = data
        .disruptions
        .make_severity(&update.id, wording, effect, update.timestamp);
    let mut messages = Vec::new();
    if let Some(text) = &update.message {
        messages.push(Message::realtime(text.clone()));
    }
    let impact = Impact {
        uri: update.id.clone(),
        application_periods: vec![base_execution_period(data, meta_vj_idx, circulation_date)],
        severity,
        messages,
        informed_entities: vec![InformedEntity::MetaVehicleJourney(meta_vj_idx)],
        amended_stop_times,
    };

    Ok(Disruption {
        uri: update.id.clone(),
        reference: update.id.clone(),
        publication_period: production_period,
        cause: String::new(),
        created_at: update.timestamp,
        updated_at: update.timestamp,
        impacts: vec![Arc::new(impact)],
    })
}

/// Full ingestion pipeline for one trip update: gate, validate, materialize,
/// re-validate, apply.
///
/// A rejected update leaves the previous realtime state untouched.
pub fn handle_trip_update(data: &mut Dataset, update: &TripUpdate) -> Result<(), Error> {
    trace!(id = update.id, "realtime trip update received");

    if !is_handleable(update)? || !check_trip_update(update) {
        debug!(id = update.id, "unhandled realtime message");
        return Err(Error::Unhandled);
    }

    let Some(meta_vj) = data.meta_vj_by_uri(&update.trip_id) else {
        error!(trip = update.trip_id, "unknown vehicle journey");
        return Err(Error::UnknownTrip(update.trip_id.clone()));
    };
    let meta_vj_idx = meta_vj.idx;

    let disruption = match create_disruption(data, update, meta_vj_idx) {
        Ok(disruption) => disruption,
        Err(err) => {
            apply::delete_disruption(data, &update.id);
            return Err(err);
        }
    };
    if !check_disruption(&disruption) {
        debug!(id = update.id, trip = update.trip_id, "disruption not valid, we do not handle it");
        apply::delete_disruption(data, &update.id);
        return Err(Error::MalformedStopTimes);
    }

    apply::apply_disruption(data, disruption, update.circulation_date()?);
    Ok(())
}
