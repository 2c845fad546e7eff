//! Passage egress - writes finished passages to file
//!
//! Passages are written in JSONL format (one JSON object per line)
//! to the file specified in config. An empty path disables egress.

use crate::domain::passage::Passage;
use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for passages
pub struct Egress {
    file_path: Option<String>,
    site_id: String,
}

impl Egress {
    pub fn new(file_path: &str, site_id: &str) -> Self {
        let file_path = if file_path.is_empty() {
            info!("egress_disabled");
            None
        } else {
            info!(file_path = %file_path, "egress_initialized");
            Some(file_path.to_string())
        };
        Self { file_path, site_id: site_id.to_string() }
    }

    pub fn is_enabled(&self) -> bool {
        self.file_path.is_some()
    }

    /// Write a passage to the egress file
    /// Returns true if successful (or egress disabled), false otherwise
    pub fn write_passage(&self, passage: &Passage) -> bool {
        let Some(file_path) = self.file_path.as_deref() else {
            return true;
        };

        let line = self.render(passage);
        match append_line(file_path, &line) {
            Ok(()) => {
                debug!(
                    pid = %passage.pid,
                    booth = %passage.booth,
                    outcome = %passage.outcome.as_str(),
                    events = %passage.events.len(),
                    "passage_egressed"
                );
                true
            }
            Err(e) => {
                error!(pid = %passage.pid, error = %e, "passage_egress_failed");
                false
            }
        }
    }

    /// Passage JSON with the site id and a wall-clock write timestamp
    fn render(&self, passage: &Passage) -> String {
        let mut obj = passage.to_json_map(Some(&self.site_id));
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        obj.insert("ts".to_string(), serde_json::Value::String(ts));
        serde_json::Value::Object(obj).to_string()
    }

    /// Write multiple passages
    pub fn write_passages(&self, passages: &[Passage]) -> usize {
        passages.iter().filter(|p| self.write_passage(p)).count()
    }
}

/// Append a line to the egress file
fn append_line(file_path: &str, line: &str) -> std::io::Result<()> {
    let path = Path::new(file_path);

    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    debug!(file = %file_path, bytes = %line.len(), "egress_written");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::passage::PassageOutcome;
    use crate::domain::types::{BoothId, Tick, VehicleId, VehicleType};
    use std::fs;
    use tempfile::tempdir;

    fn cleared_passage(vehicle: u32) -> Passage {
        let mut p = Passage::new(BoothId(1), VehicleId(vehicle), Tick(0));
        p.vehicle_type = Some(VehicleType::PersonalCar);
        p.amount = 100;
        p.paid_at = Some(Tick(120));
        p.complete(PassageOutcome::Cleared, Tick(250));
        p
    }

    #[test]
    fn test_write_passage() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("passages.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap(), "ring-road");

        let passage = cleared_passage(7);
        assert!(egress.write_passage(&passage));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["pid"], passage.pid);
        assert_eq!(parsed["site"], "ring-road");
        assert_eq!(parsed["type"], "personal_car");
        assert_eq!(parsed["out"], "cleared");
        assert!(parsed["ts"].as_str().unwrap().ends_with('Z'));

        // Passage fields plus the timestamp, nothing else
        let fields = passage.to_json_map(Some("ring-road"));
        let written = parsed.as_object().unwrap();
        assert_eq!(written.len(), fields.len() + 1);
        assert!(fields.keys().all(|k| written.get(k) == fields.get(k)));
    }

    #[test]
    fn test_write_passages_batch_appends() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("passages.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();
        let egress = Egress::new(file_path.to_str().unwrap(), "site");

        let passages: Vec<Passage> = (0..4).map(cleared_passage).collect();
        assert_eq!(egress.write_passages(&passages), 4);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("existing"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("passages.jsonl");
        let egress = Egress::new(nested.to_str().unwrap(), "site");

        assert!(egress.write_passage(&cleared_passage(1)));
        assert!(nested.exists());
    }

    #[test]
    fn test_disabled_egress() {
        let egress = Egress::new("", "site");
        assert!(!egress.is_enabled());
        assert!(egress.write_passage(&cleared_passage(1)));
    }
}
