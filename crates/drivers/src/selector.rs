use flowctl_protocol::DeviceDescription;
use tracing::info;

use crate::SwitchDriver;

/// Constructor invoked once a matcher claims a description.
pub type DriverConstructor =
    Box<dyn Fn(&DeviceDescription) -> Box<dyn SwitchDriver> + Send + Sync>;

/// Predicate deciding whether a driver entry applies to a switch.
///
/// Matchers carry an implicit priority: every exact match outranks every
/// hardware-prefix match, which outranks every software-prefix match,
/// regardless of registration order. Within one rank, first registered wins.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DriverMatcher {
    /// Full vendor + hardware + software identity match.
    Exact {
        /// Manufacturer string to match.
        vendor: String,
        /// Hardware revision string to match.
        hardware: String,
        /// Software revision string to match.
        software: String,
    },
    /// Hardware string starts with the given prefix (hardware family).
    HardwarePrefix(String),
    /// Software string starts with the given prefix (software family).
    SoftwarePrefix(String),
}

impl DriverMatcher {
    fn rank(&self) -> u8 {
        match self {
            Self::Exact { .. } => 0,
            Self::HardwarePrefix(_) => 1,
            Self::SoftwarePrefix(_) => 2,
        }
    }

    fn matches(&self, description: &DeviceDescription) -> bool {
        match self {
            Self::Exact {
                vendor,
                hardware,
                software,
            } => {
                description.vendor == *vendor
                    && description.hardware == *hardware
                    && description.software == *software
            }
            Self::HardwarePrefix(prefix) => description.hardware.starts_with(prefix),
            Self::SoftwarePrefix(prefix) => description.software.starts_with(prefix),
        }
    }
}

/// Priority-ordered table of `(matcher, constructor)` pairs with a default
/// fallback.
///
/// Selection happens exactly once per connection, after the description
/// reply. Unrecognized switches get the default constructor, which out of the
/// box builds a [`DefaultDriver`](crate::DefaultDriver).
pub struct DriverSelector {
    entries: Vec<(DriverMatcher, DriverConstructor)>,
    default: DriverConstructor,
}

impl Default for DriverSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverSelector {
    /// Creates a selector with no vendor entries; everything falls through to
    /// the default driver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default: Box::new(|_| Box::new(crate::DefaultDriver::new())),
        }
    }

    /// Registers a driver entry. Entries are consulted in matcher-rank order,
    /// then in registration order within a rank.
    pub fn register(&mut self, matcher: DriverMatcher, constructor: DriverConstructor) {
        let rank = matcher.rank();
        let insert_at = self
            .entries
            .iter()
            .position(|(existing, _)| existing.rank() > rank)
            .unwrap_or(self.entries.len());
        self.entries.insert(insert_at, (matcher, constructor));
    }

    /// Replaces the fallback constructor used when no matcher applies.
    pub fn set_default(&mut self, constructor: DriverConstructor) {
        self.default = constructor;
    }

    /// Binds a driver for the given description.
    #[must_use]
    pub fn select(&self, description: &DeviceDescription) -> Box<dyn SwitchDriver> {
        for (matcher, constructor) in &self.entries {
            if matcher.matches(description) {
                let driver = constructor(description);
                info!(
                    vendor = %description.vendor,
                    hardware = %description.hardware,
                    software = %description.software,
                    driver = driver.name(),
                    "bound switch driver"
                );
                return driver;
            }
        }
        let driver = (self.default)(description);
        info!(
            vendor = %description.vendor,
            hardware = %description.hardware,
            software = %description.software,
            driver = driver.name(),
            "no driver matched; bound default"
        );
        driver
    }
}

impl core::fmt::Debug for DriverSelector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverSelector")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableMissDriver;

    fn description(vendor: &str, hardware: &str, software: &str) -> DeviceDescription {
        DeviceDescription {
            vendor: vendor.into(),
            hardware: hardware.into(),
            software: software.into(),
            serial: "sn-1".into(),
        }
    }

    fn table_miss_ctor() -> DriverConstructor {
        Box::new(|_| Box::new(TableMissDriver::new(true)))
    }

    #[test]
    fn unmatched_description_binds_the_default_driver() {
        let selector = DriverSelector::new();
        let driver = selector.select(&description("acme", "unknown-hw", "v0"));
        assert_eq!(driver.name(), "default");
        assert!(driver.is_complete());
    }

    #[test]
    fn exact_match_outranks_prefix_matches_regardless_of_registration_order() {
        let mut selector = DriverSelector::new();
        selector.register(
            DriverMatcher::HardwarePrefix("cp".into()),
            Box::new(|_| Box::new(crate::DefaultDriver::new())),
        );
        selector.register(
            DriverMatcher::Exact {
                vendor: "cpqd".into(),
                hardware: "cpqd-hw".into(),
                software: "1.3".into(),
            },
            table_miss_ctor(),
        );

        let driver = selector.select(&description("cpqd", "cpqd-hw", "1.3"));
        assert_eq!(driver.name(), "table-miss");
    }

    #[test]
    fn hardware_prefix_outranks_software_prefix() {
        let mut selector = DriverSelector::new();
        selector.register(
            DriverMatcher::SoftwarePrefix("ofsoft".into()),
            Box::new(|_| Box::new(crate::DefaultDriver::new())),
        );
        selector.register(DriverMatcher::HardwarePrefix("open-vswitch".into()), {
            table_miss_ctor()
        });

        let driver = selector.select(&description("n/a", "open-vswitch 2.x", "ofsoftswitch"));
        assert_eq!(driver.name(), "table-miss");
    }

    #[test]
    fn software_prefix_matches_when_nothing_stronger_applies() {
        let mut selector = DriverSelector::new();
        selector.register(DriverMatcher::SoftwarePrefix("pica".into()), {
            table_miss_ctor()
        });

        let driver = selector.select(&description("pica8", "p-3290", "picos 2.0"));
        assert_eq!(driver.name(), "table-miss");
    }
}
