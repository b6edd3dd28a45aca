//! Scene log line classification
//!
//! Producers write one event per line, optionally behind a bracketed
//! timestamp:
//!
//! ```text
//! [12:04:55] Animation changed: Ember_Doggy_Rough_S1
//! [12:04:58] Speed changed: 3
//! [12:05:10] Climax: Lydia | female | Ember_Doggy_Rough_S4
//! [12:05:14] Scene ended
//! ```
//!
//! Markers are matched case-insensitively from an ordered table. Anything
//! unrecognized is ignored.

use crate::host::Gender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneLine {
    AnimationChanged(String),
    SpeedChanged(i32),
    Climax {
        actor: String,
        gender: Option<Gender>,
        animation: Option<String>,
    },
    SceneEnded,
    /// The producer's scene thread terminated. Ends the scene like
    /// `SceneEnded`.
    ThreadEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    SceneEnded,
    ThreadEnded,
    Climax,
    Speed,
    Animation,
}

/// Lower-case marker -> kind, tested in order. Terminal markers come first so
/// a payload can never shadow them.
const MARKERS: &[(&str, LineKind)] = &[
    ("scene ended", LineKind::SceneEnded),
    ("thread ended", LineKind::ThreadEnded),
    ("climax:", LineKind::Climax),
    ("speed changed:", LineKind::Speed),
    ("animation changed:", LineKind::Animation),
];

/// Classify one raw log line.
pub fn classify_line(line: &str) -> Option<SceneLine> {
    let body = strip_prefix(line.trim());
    if body.is_empty() {
        return None;
    }
    // ASCII lowering keeps byte offsets aligned with `body`
    let lower = body.to_ascii_lowercase();

    let (pos, marker, kind) = MARKERS
        .iter()
        .find_map(|(marker, kind)| lower.find(marker).map(|pos| (pos, *marker, *kind)))?;
    let payload = body[pos + marker.len()..].trim();

    match kind {
        LineKind::SceneEnded => Some(SceneLine::SceneEnded),
        LineKind::ThreadEnded => Some(SceneLine::ThreadEnded),
        LineKind::Speed => payload.parse().ok().map(SceneLine::SpeedChanged),
        LineKind::Animation => {
            if payload.is_empty() {
                None
            } else {
                Some(SceneLine::AnimationChanged(payload.to_string()))
            }
        }
        LineKind::Climax => parse_climax(payload),
    }
}

fn parse_climax(payload: &str) -> Option<SceneLine> {
    let mut fields = payload.split('|').map(str::trim);
    let actor = fields.next().filter(|s| !s.is_empty())?.to_string();
    let gender = fields.next().and_then(Gender::parse);
    let animation = fields
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(SceneLine::Climax {
        actor,
        gender,
        animation,
    })
}

/// Drop one leading `[...]` group.
fn strip_prefix(line: &str) -> &str {
    if line.starts_with('[')
        && let Some(end) = line.find(']')
    {
        return line[end + 1..].trim_start();
    }
    line
}
