//! Static translation table from DSMR reading topics to device bus paths.

use Conversion::{Identity, Kilo, NegatedKilo};

/// Unit conversion applied to a reading before it is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    /// kW to W
    Kilo,
    /// kW returned to the grid, exported as negative W
    NegatedKilo,
}

impl Conversion {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Conversion::Identity => value,
            Conversion::Kilo => value * 1000.0,
            Conversion::NegatedKilo => value * -1000.0,
        }
    }
}

/// One topic (relative to the topic root) and where its readings end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicMapping {
    pub suffix: &'static str,
    pub path: &'static str,
    pub conversion: Conversion,
}

const fn entry(
    suffix: &'static str,
    path: &'static str,
    conversion: Conversion,
) -> TopicMapping {
    TopicMapping {
        suffix,
        path,
        conversion,
    }
}

pub static TOPIC_MAPPINGS: &[TopicMapping] = &[
    entry("reading/electricity_currently_delivered", "/Ac/Power", Kilo),
    entry("reading/electricity_currently_returned", "/Ac/Power", NegatedKilo),
    entry("day-consumption/electricity_merged", "/Ac/Energy/Forward", Identity),
    entry("day-consumption/electricity_returned_merged", "/Ac/Energy/Reverse", Identity),
    entry("reading/phase_currently_delivered_l1", "/Ac/L1/Power", Kilo),
    entry("reading/phase_currently_returned_l1", "/Ac/L1/Power", NegatedKilo),
    entry("reading/phase_power_current_l1", "/Ac/L1/Current", Identity),
    entry("reading/phase_voltage_l1", "/Ac/L1/Voltage", Identity),
    entry("reading/phase_currently_delivered_l2", "/Ac/L2/Power", Kilo),
    entry("reading/phase_currently_returned_l2", "/Ac/L2/Power", NegatedKilo),
    entry("reading/phase_power_current_l2", "/Ac/L2/Current", Identity),
    entry("reading/phase_voltage_l2", "/Ac/L2/Voltage", Identity),
    entry("reading/phase_currently_delivered_l3", "/Ac/L3/Power", Kilo),
    entry("reading/phase_currently_returned_l3", "/Ac/L3/Power", NegatedKilo),
    entry("reading/phase_power_current_l3", "/Ac/L3/Current", Identity),
    entry("reading/phase_voltage_l3", "/Ac/L3/Voltage", Identity),
];

/// Finds the mapping for a full topic name under `root`.
pub fn lookup(root: &str, topic: &str) -> Option<&'static TopicMapping> {
    let suffix = topic.strip_prefix(root)?.strip_prefix('/')?;
    TOPIC_MAPPINGS.iter().find(|mapping| mapping.suffix == suffix)
}
