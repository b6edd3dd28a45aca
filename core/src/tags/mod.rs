//! Animation tag extraction
//!
//! Producers name animations with free text (`"Ember_Doggy_Rough_Oral_S2"`).
//! This module turns those identifiers into semantic [`Tag`]s through an
//! ordered substring rule table. The table is the behavior: adding a synonym
//! is a one-line data change.

use std::collections::BTreeSet;

use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    // Position
    Standing,
    Sitting,
    Lying,
    Doggy,
    Missionary,
    // Act
    Oral,
    Vaginal,
    Anal,
    Kissing,
    Touching,
    // Intensity (from the identifier)
    Rough,
    Gentle,
    Aggressive,
    // Markers
    Transition,
    Spread,
    Press,
    // Speed level
    LowIntensity,
    MediumIntensity,
    HighIntensity,
    // Terminal event
    Climax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCategory {
    Position,
    Act,
    Intensity,
    Marker,
    Speed,
    Event,
}

impl Tag {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standing => "standing",
            Self::Sitting => "sitting",
            Self::Lying => "lying",
            Self::Doggy => "doggy",
            Self::Missionary => "missionary",
            Self::Oral => "oral",
            Self::Vaginal => "vaginal",
            Self::Anal => "anal",
            Self::Kissing => "kissing",
            Self::Touching => "touching",
            Self::Rough => "rough",
            Self::Gentle => "gentle",
            Self::Aggressive => "aggressive",
            Self::Transition => "transition",
            Self::Spread => "spread",
            Self::Press => "press",
            Self::LowIntensity => "low_intensity",
            Self::MediumIntensity => "medium_intensity",
            Self::HighIntensity => "high_intensity",
            Self::Climax => "climax",
        }
    }

    pub fn category(&self) -> TagCategory {
        match self {
            Self::Standing | Self::Sitting | Self::Lying | Self::Doggy | Self::Missionary => {
                TagCategory::Position
            }
            Self::Oral | Self::Vaginal | Self::Anal | Self::Kissing | Self::Touching => {
                TagCategory::Act
            }
            Self::Rough | Self::Gentle | Self::Aggressive => TagCategory::Intensity,
            Self::Transition | Self::Spread | Self::Press => TagCategory::Marker,
            Self::LowIntensity | Self::MediumIntensity | Self::HighIntensity => TagCategory::Speed,
            Self::Climax => TagCategory::Event,
        }
    }

    /// Exact, case-insensitive lookup by canonical name.
    pub fn from_name(name: &str) -> Option<Tag> {
        TAG_NAMES.get(name.trim().to_ascii_lowercase().as_str()).copied()
    }
}

static TAG_NAMES: phf::Map<&'static str, Tag> = phf_map! {
    "standing" => Tag::Standing,
    "sitting" => Tag::Sitting,
    "lying" => Tag::Lying,
    "doggy" => Tag::Doggy,
    "missionary" => Tag::Missionary,
    "oral" => Tag::Oral,
    "vaginal" => Tag::Vaginal,
    "anal" => Tag::Anal,
    "kissing" => Tag::Kissing,
    "touching" => Tag::Touching,
    "rough" => Tag::Rough,
    "gentle" => Tag::Gentle,
    "aggressive" => Tag::Aggressive,
    "transition" => Tag::Transition,
    "spread" => Tag::Spread,
    "press" => Tag::Press,
    "low_intensity" => Tag::LowIntensity,
    "medium_intensity" => Tag::MediumIntensity,
    "high_intensity" => Tag::HighIntensity,
    "climax" => Tag::Climax,
};

/// Substring (lower-case) -> tag, tested in order.
const RULES: &[(&str, Tag)] = &[
    ("standing", Tag::Standing),
    ("sitting", Tag::Sitting),
    ("seated", Tag::Sitting),
    ("lying", Tag::Lying),
    ("laying", Tag::Lying),
    ("doggy", Tag::Doggy),
    ("missionary", Tag::Missionary),
    ("oral", Tag::Oral),
    ("blowjob", Tag::Oral),
    ("cunnilingus", Tag::Oral),
    ("vaginal", Tag::Vaginal),
    ("anal", Tag::Anal),
    ("kiss", Tag::Kissing),
    ("touch", Tag::Touching),
    ("grope", Tag::Touching),
    ("rough", Tag::Rough),
    ("gentle", Tag::Gentle),
    ("aggressive", Tag::Aggressive),
    ("transition", Tag::Transition),
    ("spread", Tag::Spread),
    ("press", Tag::Press),
];

pub type TagSet = BTreeSet<Tag>;

/// Classify an animation identifier.
pub fn classify(identifier: &str) -> TagSet {
    let lower = identifier.to_lowercase();
    RULES
        .iter()
        .filter(|(pattern, _)| lower.contains(pattern))
        .map(|(_, tag)| *tag)
        .collect()
}

/// Map a raw speed level to an intensity tag.
pub fn speed_tag(level: i32) -> Tag {
    if level >= 3 {
        Tag::HighIntensity
    } else if level >= 2 {
        Tag::MediumIntensity
    } else {
        Tag::LowIntensity
    }
}

/// Tags for a climax marker, plus whatever the identifier logged alongside
/// it classifies to.
pub fn climax_tags(identifier: Option<&str>) -> TagSet {
    let mut tags = identifier.map(classify).unwrap_or_default();
    tags.insert(Tag::Climax);
    tags
}

/// First position tag in rule order.
pub fn position(tags: &TagSet) -> Option<Tag> {
    first_in_rule_order(tags, TagCategory::Position)
}

/// First identifier-derived intensity in rule order, falling back to the
/// speed tag.
pub fn intensity(tags: &TagSet) -> Option<Tag> {
    first_in_rule_order(tags, TagCategory::Intensity)
        .or_else(|| tags.iter().copied().find(|t| t.category() == TagCategory::Speed))
}

fn first_in_rule_order(tags: &TagSet, category: TagCategory) -> Option<Tag> {
    RULES
        .iter()
        .map(|(_, tag)| *tag)
        .find(|tag| tag.category() == category && tags.contains(tag))
}

/// Comma-joined tag names, for logs.
pub fn describe(tags: &TagSet) -> String {
    tags.iter().map(Tag::name).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doggy_rough_oral() {
        let tags = classify("doggy_rough_oral");
        assert!(tags.contains(&Tag::Doggy));
        assert!(tags.contains(&Tag::Rough));
        assert!(tags.contains(&Tag::Oral));
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let tags = classify("Ember_MISSIONARY_Gentle_Kiss_S1");
        assert_eq!(
            tags,
            [Tag::Missionary, Tag::Kissing, Tag::Gentle].into_iter().collect()
        );
    }

    #[test]
    fn test_unmatched_identifier_yields_nothing() {
        assert!(classify("idle_loop_03").is_empty());
        assert!(classify("").is_empty());
    }

    #[test]
    fn test_speed_thresholds() {
        assert_eq!(speed_tag(3), Tag::HighIntensity);
        assert_eq!(speed_tag(7), Tag::HighIntensity);
        assert_eq!(speed_tag(2), Tag::MediumIntensity);
        assert_eq!(speed_tag(1), Tag::LowIntensity);
        assert_eq!(speed_tag(0), Tag::LowIntensity);
        assert_eq!(speed_tag(-1), Tag::LowIntensity);
    }

    #[test]
    fn test_climax_reclassifies_carried_identifier() {
        let tags = climax_tags(Some("standing_anal"));
        assert!(tags.contains(&Tag::Climax));
        assert!(tags.contains(&Tag::Standing));
        assert!(tags.contains(&Tag::Anal));

        assert_eq!(climax_tags(None), [Tag::Climax].into_iter().collect());
    }

    #[test]
    fn test_summary_picks_first_in_rule_order() {
        let tags = classify("standing_to_lying_transition");
        assert_eq!(position(&tags), Some(Tag::Standing));
        assert!(tags.contains(&Tag::Transition));

        let mut tags = classify("aggressive_rough");
        assert_eq!(intensity(&tags), Some(Tag::Rough));
        tags.clear();
        tags.insert(Tag::MediumIntensity);
        assert_eq!(intensity(&tags), Some(Tag::MediumIntensity));
    }

    #[test]
    fn test_from_name_covers_every_tag() {
        for (_, tag) in RULES {
            assert_eq!(Tag::from_name(tag.name()), Some(*tag));
        }
        assert_eq!(Tag::from_name("High_Intensity"), Some(Tag::HighIntensity));
        assert_eq!(Tag::from_name("climax"), Some(Tag::Climax));
        assert_eq!(Tag::from_name("nonsense"), None);
    }
}
