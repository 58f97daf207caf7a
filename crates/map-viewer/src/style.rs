//! Per-feature style resolution.
//!
//! Styling is a pure function of the feature's attributes, the layer's
//! [`StylingPolicy`] and the match state, so map rendering and any other caller
//! resolve identical results regardless of call order.

use crate::data::types::LayerSpec;
use crate::filter::Query;
use geodata::FeatureRecord;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Pixel distance under which points of a clustered layer are grouped.
pub const DEFAULT_CLUSTER_DISTANCE_PX: f64 = 40.0;

/// Marker artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    Marker,
    Landscape,
    Water,
    Heritage,
    Forest,
    Other,
}

/// What the map draws for a feature or cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Icon(Icon),
    /// The shared cluster marker annotated with its member count.
    Cluster { count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StylingPolicy {
    /// One icon for every matching feature.
    Plain { icon: Icon },

    /// Like `Plain`, with nearby points grouped into clusters. `icon` is the
    /// singleton style.
    Clustered {
        icon: Icon,
        #[serde(default = "default_cluster_distance")]
        distance_px: f64,
    },

    /// Icon chosen by the value of `attribute`.
    Categorical {
        attribute: String,
        categories: IndexMap<String, Icon>,
        default_icon: Icon,
    },
}

fn default_cluster_distance() -> f64 {
    DEFAULT_CLUSTER_DISTANCE_PX
}

impl StylingPolicy {
    /// Cluster distance in pixels, when the layer clusters.
    pub fn cluster_distance(&self) -> Option<f64> {
        match self {
            StylingPolicy::Clustered { distance_px, .. } => Some(*distance_px),
            _ => None,
        }
    }
}

/// Resolves a feature's style; `None` means hidden.
///
/// An inactive filter matches every feature, so `matched` is always true in
/// that case and the categorical lookup applies unconditionally.
pub fn resolve_style(feature: &FeatureRecord, policy: &StylingPolicy, matched: bool) -> Option<Style> {
    if !matched {
        return None;
    }

    let icon = match policy {
        StylingPolicy::Plain { icon } | StylingPolicy::Clustered { icon, .. } => *icon,
        StylingPolicy::Categorical {
            attribute,
            categories,
            default_icon,
        } => categories
            .get(feature.attribute(attribute))
            .copied()
            .unwrap_or(*default_icon),
    };

    Some(Style::Icon(icon))
}

/// Matches `feature` with the layer's own field policy and resolves its style.
pub fn style_for(feature: &FeatureRecord, layer: &LayerSpec, query: &Query) -> Option<Style> {
    resolve_style(feature, &layer.styling, query.matches(feature, &layer.search_fields))
}
