use std::collections::BTreeSet;

use crate::types::{EndpointVersion, OftVersion};

/// Version signals gathered from one adapter during a discovery round.
///
/// Signals are only collected here; [`Evidence::resolve`] turns them into versions in one step
/// so the outcome does not depend on the order calls were decoded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    /// `endpoint()` answered with data.
    pub endpoint: bool,
    /// `lzEndpoint()` answered with data.
    pub lz_endpoint: bool,
    /// Non-zero `sharedDecimals()`.
    pub shared_decimals: Option<u8>,
    /// Send-style probes that produced return or revert data.
    pub send_probes: BTreeSet<OftVersion>,
}

/// Versions settled for an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution {
    pub oft_version: Option<OftVersion>,
    pub endpoint_version: Option<EndpointVersion>,
}

impl Evidence {
    /// Precedence, highest first:
    ///
    /// 1. the highest send probe that answered fixes the OFT version, and the endpoint version
    ///    follows from it;
    /// 2. `endpoint()` or a shared-decimals value means endpoint v2, `lzEndpoint()` means v1;
    /// 3. otherwise the metadata prior is kept.
    ///
    /// A prior OFT version that contradicts the resolved endpoint version is dropped.
    pub fn resolve(&self, prior: Resolution) -> Resolution {
        if let Some(version) = self.send_probes.iter().next_back().copied() {
            return Resolution {
                oft_version: Some(version),
                endpoint_version: Some(version.endpoint_version()),
            };
        }

        let endpoint_version = if self.endpoint || self.shared_decimals.is_some() {
            Some(EndpointVersion::V2)
        } else if self.lz_endpoint {
            Some(EndpointVersion::V1)
        } else {
            prior.endpoint_version
        };

        let oft_version = match (prior.oft_version, endpoint_version) {
            (Some(v), Some(ep)) if v.endpoint_version() != ep => None,
            (v, _) => v,
        };

        Resolution {
            oft_version,
            endpoint_version,
        }
    }
}
