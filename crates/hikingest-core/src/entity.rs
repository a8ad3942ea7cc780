//! Entity catalogue — one static schema per exported HikCentral report.
//!
//! A schema ties together everything the pipeline needs to know about a
//! report: where it lives in the workbook, how vendor headers map onto
//! canonical field names, which fields make up the dedup key, and how the
//! upsert resolves conflicts by default.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

// ─── Field description ───────────────────────────────────────────────────────

/// How a raw cell is converted into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  /// Trimmed string; empty after trim is null.
  Text,
  /// Tolerantly parsed wall-clock timestamp; unparseable is null.
  Timestamp,
}

/// One column of an exported sheet.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
  /// Header label exactly as the vendor console writes it.
  pub header: &'static str,
  /// Canonical field name; doubles as the SQL column name.
  pub field:  &'static str,
  pub kind:   FieldKind,
}

const fn text(header: &'static str, field: &'static str) -> ColumnDef {
  ColumnDef { header, field, kind: FieldKind::Text }
}

const fn timestamp(header: &'static str, field: &'static str) -> ColumnDef {
  ColumnDef { header, field, kind: FieldKind::Timestamp }
}

// ─── Conflict policy ─────────────────────────────────────────────────────────

/// What the upsert does when a row's dedup key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
  /// Leave the stored row untouched.
  Skip,
  /// Overwrite every non-key field with the incoming values.
  Refresh,
}

impl ConflictMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Skip => "skip",
      Self::Refresh => "refresh",
    }
  }
}

impl fmt::Display for ConflictMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ConflictMode {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "skip" => Ok(Self::Skip),
      "refresh" => Ok(Self::Refresh),
      _ => Err(Error::UnknownConflictMode(s.to_owned())),
    }
  }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Static description of one exportable report.
#[derive(Debug, Clone)]
pub struct EntitySchema {
  pub kind:             EntityKind,
  /// Destination table.
  pub table:            &'static str,
  /// Worksheet name inside the exported workbook.
  pub sheet:            &'static str,
  /// Value of the first header cell; everything above it is title noise.
  pub sentinel:         &'static str,
  /// Prefix of the file names the console gives this export.
  pub file_prefix:      &'static str,
  /// Ordered column mapping.
  pub columns:          &'static [ColumnDef],
  /// Ordered subset of fields hashed into the dedup key.
  pub key_fields:       &'static [&'static str],
  /// A data row is kept only if at least one of these is non-blank.
  pub presence_fields:  &'static [&'static str],
  /// A normalized row with any of these null is dropped.
  pub required_fields:  &'static [&'static str],
  /// Timestamp field from which the `period` (YYYYMMDD) column is derived.
  pub period_source:    Option<&'static str>,
  pub default_conflict: ConflictMode,
}

impl EntitySchema {
  /// Position of `field` in [`Self::columns`].
  pub fn position(&self, field: &str) -> Option<usize> {
    self.columns.iter().position(|c| c.field == field)
  }

  /// Canonical field names in column order.
  pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.columns.iter().map(|c| c.field)
  }
}

static ALARM_EVENT: EntitySchema = EntitySchema {
  kind:             EntityKind::AlarmEvent,
  table:            "alarm_events",
  sheet:            "Alarm and Event Log",
  sentinel:         "Mark",
  file_prefix:      "Alarm_Report",
  columns:          &[
    text("Mark", "mark"),
    text("Name", "name"),
    text("Trigger Alarm", "trigger_alarm"),
    text("Priority", "priority"),
    timestamp("Triggering Time (Client)", "triggering_time"),
    text("Source", "source"),
    text("Region", "region"),
    text("Trigger Event", "trigger_event"),
    text("Description", "description"),
    text("Status", "status"),
    timestamp("Alarm Acknowledgment Time", "acknowledged_at"),
    text("Alarm Category", "alarm_category"),
    text("Remarks", "remarks"),
    text("More", "more"),
  ],
  key_fields:       &["name", "triggering_time", "source", "region", "trigger_event"],
  presence_fields:  &["name", "triggering_time", "source", "region", "trigger_event"],
  required_fields:  &["name"],
  period_source:    Some("triggering_time"),
  default_conflict: ConflictMode::Skip,
};

static CAMERA_STATUS: EntitySchema = EntitySchema {
  kind:             EntityKind::CameraStatus,
  table:            "camera_status",
  sheet:            "Camera",
  sentinel:         "Mark",
  file_prefix:      "Camera_",
  columns:          &[
    text("Name", "camera_name"),
    text("Channel Address", "device_code"),
    text("Device Address", "device_address"),
    text("Area", "site_name"),
    text("Device Model", "device_model"),
    text("Network Status", "network_status"),
    text("Video Signal", "video_signal"),
    text("Recording Status", "recording_status"),
    timestamp("Auto-Check Time", "auto_check_time"),
  ],
  key_fields:       &["camera_name", "device_code"],
  presence_fields:  &["camera_name", "device_code"],
  required_fields:  &["camera_name"],
  period_source:    None,
  default_conflict: ConflictMode::Refresh,
};

static ENCODING_DEVICE: EntitySchema = EntitySchema {
  kind:             EntityKind::EncodingDevice,
  table:            "encoding_device_status",
  sheet:            "Encoding Device",
  sentinel:         "Mark",
  file_prefix:      "Encoding Device_",
  columns:          &[
    text("Name", "name"),
    text("Address", "address"),
    text("Serial No.", "serial_no"),
    text("Version", "version"),
    text("Network Status", "network_status"),
    text("Time Sync Status", "time_sync_status"),
    text("HDD Status", "hdd_status"),
    text("HDD Usage", "hdd_usage"),
    text("RAID", "raid"),
    text("Recording Status", "recording_status"),
    text("Hot Spare Status", "hot_spare_status"),
    text("Arming Status", "arming_status"),
    text("Manufacturer", "manufacturer"),
    timestamp("First Added Time", "first_added_time"),
    timestamp("Auto-Check Time", "auto_check_time"),
  ],
  key_fields:       &["name", "address"],
  presence_fields:  &["name", "address"],
  required_fields:  &["name"],
  period_source:    None,
  default_conflict: ConflictMode::Refresh,
};

static IP_SPEAKER: EntitySchema = EntitySchema {
  kind:             EntityKind::IpSpeaker,
  table:            "ip_speaker_status",
  sheet:            "IP Speaker",
  sentinel:         "Mark",
  file_prefix:      "IP Speaker_",
  columns:          &[
    text("Name", "name"),
    text("Address", "address"),
    text("Serial No.", "serial_no"),
    text("Version", "version"),
    text("Network Status", "network_status"),
    text("Time Sync Status", "time_sync_status"),
    timestamp("First Added Time", "first_added_time"),
    timestamp("Auto-Check Time", "auto_check_time"),
  ],
  key_fields:       &["name", "address"],
  presence_fields:  &["name", "address"],
  required_fields:  &["name"],
  period_source:    None,
  default_conflict: ConflictMode::Refresh,
};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The reports the ingester knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  AlarmEvent,
  CameraStatus,
  EncodingDevice,
  IpSpeaker,
}

impl EntityKind {
  pub const ALL: [EntityKind; 4] = [
    Self::AlarmEvent,
    Self::CameraStatus,
    Self::EncodingDevice,
    Self::IpSpeaker,
  ];

  pub fn schema(self) -> &'static EntitySchema {
    match self {
      Self::AlarmEvent => &ALARM_EVENT,
      Self::CameraStatus => &CAMERA_STATUS,
      Self::EncodingDevice => &ENCODING_DEVICE,
      Self::IpSpeaker => &IP_SPEAKER,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::AlarmEvent => "alarm_event",
      Self::CameraStatus => "camera_status",
      Self::EncodingDevice => "encoding_device",
      Self::IpSpeaker => "ip_speaker",
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EntityKind {
  type Err = Error;

  /// Accepts both `snake_case` and `kebab-case` spellings.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
    Self::ALL
      .into_iter()
      .find(|k| k.as_str() == wanted)
      .ok_or_else(|| Error::UnknownEntity(s.to_owned()))
  }
}
