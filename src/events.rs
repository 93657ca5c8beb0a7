//! Simulation event log
//!
//! A plain value threaded `&mut` through the tick phases, never a global.
//! Events accumulate in memory and, when a sink is attached, stream to a
//! CSV file (`tick,event_type,agent_id,region_id,magnitude,details`) for
//! offline analysis.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Kinds of notable simulation events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Birth,
    Death,
    Trade,
    Migration,
    SystemChange,
    HardshipCrisis,
    DevelopmentMilestone,
    MovementFormed,
    CulturalClusterSplit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Birth => "BIRTH",
            EventKind::Death => "DEATH",
            EventKind::Trade => "TRADE",
            EventKind::Migration => "MIGRATION",
            EventKind::SystemChange => "SYSTEM_CHANGE",
            EventKind::HardshipCrisis => "HARDSHIP_CRISIS",
            EventKind::DevelopmentMilestone => "DEVELOPMENT_MILESTONE",
            EventKind::MovementFormed => "MOVEMENT_FORMED",
            EventKind::CulturalClusterSplit => "CULTURAL_CLUSTER_SPLIT",
        }
    }
}

/// One recorded event.
#[derive(Clone, Debug)]
pub struct Event {
    pub tick: u64,
    pub kind: EventKind,
    pub agent_id: u32,
    pub region_id: u32,
    pub magnitude: f64,
    pub details: String,
}

/// In-memory event log with an optional CSV sink.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
    sink: Option<BufWriter<File>>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    /// Attach a CSV sink; the header row is written immediately.
    pub fn with_csv(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut sink = BufWriter::new(File::create(path)?);
        writeln!(sink, "tick,event_type,agent_id,region_id,magnitude,details")?;
        Ok(EventLog {
            events: Vec::new(),
            sink: Some(sink),
        })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(sink) = &mut self.sink {
            sink.flush()?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        tick: u64,
        kind: EventKind,
        agent_id: u32,
        region_id: u32,
        magnitude: f64,
        details: String,
    ) {
        if let Some(sink) = &mut self.sink {
            // A failed sink write loses the mirror line, not the event
            let _ = writeln!(
                sink,
                "{},{},{},{},{:.4},\"{}\"",
                tick,
                kind.as_str(),
                agent_id,
                region_id,
                magnitude,
                details
            );
        }
        self.events.push(Event {
            tick,
            kind,
            agent_id,
            region_id,
            magnitude,
            details,
        });
    }

    pub fn log_birth(&mut self, tick: u64, agent_id: u32, region_id: u32, mother_id: u32) {
        self.record(
            tick,
            EventKind::Birth,
            agent_id,
            region_id,
            1.0,
            format!("mother={mother_id}"),
        );
    }

    pub fn log_death(&mut self, tick: u64, agent_id: u32, region_id: u32, age: f64) {
        self.record(
            tick,
            EventKind::Death,
            agent_id,
            region_id,
            1.0,
            format!("age={age:.1}"),
        );
    }

    pub fn log_trade(
        &mut self,
        tick: u64,
        from_region: u32,
        to_region: u32,
        good: usize,
        volume: f64,
        value: f64,
    ) {
        self.record(
            tick,
            EventKind::Trade,
            0,
            from_region,
            value,
            format!("to={to_region};good={good};volume={volume:.2}"),
        );
    }

    pub fn log_migration(&mut self, tick: u64, agent_id: u32, from_region: u32, to_region: u32) {
        self.record(
            tick,
            EventKind::Migration,
            agent_id,
            to_region,
            1.0,
            format!("from={from_region};to={to_region}"),
        );
    }

    pub fn log_system_change(&mut self, tick: u64, region_id: u32, from: &str, to: &str) {
        self.record(
            tick,
            EventKind::SystemChange,
            0,
            region_id,
            1.0,
            format!("from={from};to={to}"),
        );
    }

    pub fn log_hardship_crisis(&mut self, tick: u64, region_id: u32, hardship: f64) {
        self.record(
            tick,
            EventKind::HardshipCrisis,
            0,
            region_id,
            hardship,
            format!("hardship={hardship:.3}"),
        );
    }

    pub fn log_development_milestone(&mut self, tick: u64, region_id: u32, development: f64) {
        self.record(
            tick,
            EventKind::DevelopmentMilestone,
            0,
            region_id,
            development,
            format!("development={development:.2}"),
        );
    }

    pub fn log_movement_formed(
        &mut self,
        tick: u64,
        cluster_id: u32,
        region_id: u32,
        members: usize,
    ) {
        self.record(
            tick,
            EventKind::MovementFormed,
            0,
            region_id,
            members as f64,
            format!("cluster={cluster_id};members={members}"),
        );
    }

    pub fn log_cluster_split(&mut self, tick: u64, cluster_id: u32, members: usize) {
        self.record(
            tick,
            EventKind::CulturalClusterSplit,
            0,
            0,
            members as f64,
            format!("cluster={cluster_id};members={members}"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_accumulate_and_filter() {
        let mut log = EventLog::new();
        log.log_birth(1, 10, 2, 5);
        log.log_death(2, 5, 2, 71.3);
        log.log_birth(3, 11, 0, 6);

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_of_kind(EventKind::Birth).count(), 2);
        assert_eq!(log.events_of_kind(EventKind::Trade).count(), 0);
    }

    #[test]
    fn test_csv_sink_writes_header_and_rows() {
        let dir = std::env::temp_dir().join("civsim_event_test");
        let path = dir.join("events.csv");
        let mut log = EventLog::with_csv(&path).unwrap();
        log.log_migration(4, 7, 1, 3);
        log.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "tick,event_type,agent_id,region_id,magnitude,details"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("4,MIGRATION,7,3,"));
        assert!(row.contains("from=1;to=3"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
