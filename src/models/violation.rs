// src/models/violation.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Kind of proctoring violation.
///
/// Payloads naming any other kind are rejected when parsed; `Other` is the
/// explicit catch-all the proctoring layer must opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    TabSwitch,
    WindowBlur,
    FullscreenExit,
    Other,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::WindowBlur => "window_blur",
            ViolationType::FullscreenExit => "fullscreen_exit",
            ViolationType::Other => "other",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown violation type '{0}'")]
pub struct UnknownViolationType(pub String);

impl FromStr for ViolationType {
    type Err = UnknownViolationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tab_switch" => Ok(ViolationType::TabSwitch),
            "window_blur" => Ok(ViolationType::WindowBlur),
            "fullscreen_exit" => Ok(ViolationType::FullscreenExit),
            "other" => Ok(ViolationType::Other),
            unknown => Err(UnknownViolationType(unknown.to_string())),
        }
    }
}

/// A violation as shown to a teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Durable row id, or a synthesized id for live events that carried none.
    pub id: String,
    pub teacher_id: i64,
    pub quiz_id: Option<i64>,
    pub student_name: String,
    pub quiz_title: String,
    pub violation_type: ViolationType,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

/// Payload of a `violation_occurred` event on the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Durable id, when the producer recorded the violation before publishing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub teacher_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<i64>,
    pub student_name: String,
    pub quiz_title: String,
    pub violation_type: ViolationType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ViolationEvent {
    /// Id standing in for a missing durable id.
    ///
    /// Derived from the teacher and the event timestamp only, so a redelivery
    /// with the same timestamp maps to the same id while any other timestamp
    /// is a different violation.
    pub fn synthesized_id(&self) -> String {
        format!("live-{}-{}", self.teacher_id, self.timestamp.timestamp_millis())
    }

    pub fn resolved_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.synthesized_id(),
        }
    }

    pub fn into_violation(self) -> Violation {
        let id = self.resolved_id();
        Violation {
            id,
            teacher_id: self.teacher_id,
            quiz_id: self.quiz_id,
            student_name: self.student_name,
            quiz_title: self.quiz_title,
            violation_type: self.violation_type,
            occurred_at: self.timestamp,
        }
    }
}

impl From<&Violation> for ViolationEvent {
    fn from(v: &Violation) -> Self {
        Self {
            id: Some(v.id.clone()),
            teacher_id: v.teacher_id,
            quiz_id: v.quiz_id,
            student_name: v.student_name.clone(),
            quiz_title: v.quiz_title.clone(),
            violation_type: v.violation_type,
            timestamp: v.occurred_at,
        }
    }
}

/// DTO sent by the proctoring layer when a student trips a check.
#[derive(Debug, Deserialize, Validate)]
pub struct ReportViolationRequest {
    pub quiz_id: i64,

    #[validate(length(min = 1, max = 100))]
    pub student_name: String,

    pub violation_type: ViolationType,
}
