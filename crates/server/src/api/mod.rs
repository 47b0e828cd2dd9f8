pub mod journeys;
pub mod realtime;
pub mod schedules;
