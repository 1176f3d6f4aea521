//! Region routing for the backend services.
//!
//! Each [`ServiceKind`] has a public host per region and, for a few regions,
//! a private-zone host used when the process runs inside the VPC.

use std::fmt;
use std::time::Duration;

use crate::error::SdkError;
use crate::region::Region;

/// Environment variable selecting the region (`"cn"`, `"12"`, ...).
pub const REGION_ENV: &str = "RESTAPI_REGION";

/// Environment variable flagging a private-zone deployment.
pub const PRIVATE_ZONE_ENV: &str = "DEPLOY_IS_VPC_ZONE";

/// How long a resolved route stays valid.
pub const ROUTE_TTL: Duration = Duration::from_secs(3600);

const SERVICE_IV: &str = "uhomescomtianlei";
const PAY_IV: &str = "uhomescomleitian";

/// Backend service family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Sso,
    Service,
    Pay,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sso => "sso",
            Self::Service => "service",
            Self::Pay => "pay",
        })
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sso" => Ok(Self::Sso),
            "service" | "srv" => Ok(Self::Service),
            "pay" => Ok(Self::Pay),
            other => Err(SdkError::Config(format!("unknown service kind: {other}"))),
        }
    }
}

impl ServiceKind {
    fn public_host(self, region: Region) -> Option<&'static str> {
        let host = match (self, region) {
            (Self::Sso, Region::Dev) => "ssoapi.uhouzz.xyz",
            (Self::Sso, Region::Testing) => "ssoapi-test.uhomes.com",
            (Self::Sso, Region::Uat) => "ssoapi-uat.uhomes.com",
            (Self::Sso, Region::Cn) => "ssoapi.uhomes.com",
            (Self::Sso, Region::Hk) => "ssoapi-hk.uhomes.com",
            (Self::Sso, Region::Us) => "ssoapi-us.uhomes.com",

            (Self::Service, Region::Dev) => "srvapi.uhomes.xyz",
            (Self::Service, Region::Testing) => "srvapi-test.uhomes.com",
            (Self::Service, Region::Uat) => "srvapi-uat.uhomes.com",
            (Self::Service, Region::Cn) => "srvapi.uhomes.com",
            (Self::Service, Region::Hk) => "srvapi-hk.uhomes.com",
            (Self::Service, Region::Us) => "srvapi-us.uhomes.com",

            (Self::Pay, Region::Dev) => "pay.uhomes.xyz",
            (Self::Pay, Region::Testing) => "testpay.uhomes.com",
            (Self::Pay, Region::Uat) => "payuat.uhomes.com",
            (Self::Pay, Region::Cn) => "pay.uhomes.com",

            _ => return None,
        };
        Some(host)
    }

    fn private_host(self, region: Region) -> Option<&'static str> {
        let host = match (self, region) {
            (Self::Sso, Region::Cn) => "ssoapi.uhomes.local",
            (Self::Sso, Region::Testing) => "ssoapi.uhomes-test.local",
            (Self::Sso, Region::Uat) => "ssoapi-uat.uhomes-test.local",

            (Self::Service, Region::Cn) => "srvapi.uhomes.local",
            (Self::Service, Region::Testing) => "srvapi.uhomes-test.local",
            (Self::Service, Region::Uat) => "srvapi-uat.uhomes-test.local",

            (Self::Pay, Region::Cn) => "payapi.uhomes.local",
            (Self::Pay, Region::Testing) => "payapi.uhomes-test.local",
            (Self::Pay, Region::Uat) => "payapi.uhomes-uat.local",

            _ => return None,
        };
        Some(host)
    }

    fn iv(self) -> &'static str {
        match self {
            Self::Sso | Self::Service => SERVICE_IV,
            Self::Pay => PAY_IV,
        }
    }
}

/// Resolved route for one service kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    /// Host name, without scheme
    pub api_server: String,
    /// Initialization vector for request signatures
    pub iv: String,
    pub ttl: Duration,
    pub is_private_zone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    kind: ServiceKind,
    region: Region,
    private_zone: bool,
}

impl Router {
    #[must_use]
    pub fn new(kind: ServiceKind, region: Region, private_zone: bool) -> Self {
        Self {
            kind,
            region,
            private_zone,
        }
    }

    /// Router for `kind` using `RESTAPI_REGION` and `DEPLOY_IS_VPC_ZONE`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::InvalidRegion`] when `RESTAPI_REGION` is set to an
    /// unknown region.
    pub fn from_env(kind: ServiceKind) -> Result<Self, SdkError> {
        let region = match std::env::var(REGION_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => Region::default(),
        };
        Ok(Self::new(kind, region, private_zone_from_env()))
    }

    #[must_use]
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    #[must_use]
    pub fn is_private_zone(&self) -> bool {
        self.private_zone
    }

    /// Signature IV; depends on the service kind only.
    #[must_use]
    pub fn iv(&self) -> &'static str {
        self.kind.iv()
    }

    /// Resolve the route table.
    ///
    /// In a private zone the host switches to the internal one when the
    /// region has it; the flag is reported either way.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnsupportedRegion`] if the service has no host in
    /// this region.
    pub fn routes(&self) -> Result<RouteTable, SdkError> {
        let public = self
            .kind
            .public_host(self.region)
            .ok_or_else(|| SdkError::UnsupportedRegion {
                kind: self.kind,
                region: self.region.to_string(),
            })?;

        let host = if self.private_zone {
            self.kind.private_host(self.region).unwrap_or(public)
        } else {
            public
        };

        Ok(RouteTable {
            api_server: host.to_owned(),
            iv: self.kind.iv().to_owned(),
            ttl: ROUTE_TTL,
            is_private_zone: self.private_zone,
        })
    }
}

/// `DEPLOY_IS_VPC_ZONE` is truthy when set, non-empty and not `0`/`false`.
#[must_use]
pub fn private_zone_from_env() -> bool {
    std::env::var(PRIVATE_ZONE_ENV).is_ok_and(|v| {
        let v = v.trim();
        !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn public_routes() {
        let table = Router::new(ServiceKind::Service, Region::Hk, false)
            .routes()
            .unwrap();
        assert_eq!(table.api_server, "srvapi-hk.uhomes.com");
        assert_eq!(table.iv, "uhomescomtianlei");
        assert_eq!(table.ttl, Duration::from_secs(3600));
        assert!(!table.is_private_zone);

        let table = Router::new(ServiceKind::Sso, Region::Dev, false).routes().unwrap();
        assert_eq!(table.api_server, "ssoapi.uhouzz.xyz");

        let table = Router::new(ServiceKind::Pay, Region::Uat, false).routes().unwrap();
        assert_eq!(table.api_server, "payuat.uhomes.com");
        assert_eq!(table.iv, "uhomescomleitian");
    }

    #[test]
    fn iv_is_available_without_a_route() {
        let router = Router::new(ServiceKind::Pay, Region::Gb, false);
        assert!(router.routes().is_err());
        assert_eq!(router.iv(), "uhomescomleitian");
    }

    #[test]
    fn private_zone_switches_host_when_available() {
        let table = Router::new(ServiceKind::Pay, Region::Cn, true).routes().unwrap();
        assert_eq!(table.api_server, "payapi.uhomes.local");
        assert!(table.is_private_zone);

        let table = Router::new(ServiceKind::Sso, Region::Uat, true).routes().unwrap();
        assert_eq!(table.api_server, "ssoapi-uat.uhomes-test.local");

        // no local host for HK
        let table = Router::new(ServiceKind::Service, Region::Hk, true)
            .routes()
            .unwrap();
        assert_eq!(table.api_server, "srvapi-hk.uhomes.com");
        assert!(table.is_private_zone);
    }

    #[test]
    fn unsupported_region() {
        let err = Router::new(ServiceKind::Pay, Region::Us, false)
            .routes()
            .unwrap_err();
        assert!(matches!(
            err,
            SdkError::UnsupportedRegion { kind: ServiceKind::Pay, ref region } if region == "US"
        ));
        assert!(Router::new(ServiceKind::Sso, Region::Gb, false).routes().is_err());
    }

    #[test]
    fn from_env_defaults_to_cn() {
        temp_env::with_vars_unset([REGION_ENV, PRIVATE_ZONE_ENV], || {
            let router = Router::from_env(ServiceKind::Service).unwrap();
            assert_eq!(router.region(), Region::Cn);
            assert!(!router.is_private_zone());
        });
    }

    #[test]
    fn from_env_reads_region_and_zone() {
        temp_env::with_vars(
            [(REGION_ENV, Some("testing")), (PRIVATE_ZONE_ENV, Some("1"))],
            || {
                let table = Router::from_env(ServiceKind::Service)
                    .unwrap()
                    .routes()
                    .unwrap();
                assert_eq!(table.api_server, "srvapi.uhomes-test.local");
            },
        );
        temp_env::with_var(REGION_ENV, Some("atlantis"), || {
            assert!(matches!(
                Router::from_env(ServiceKind::Sso),
                Err(SdkError::InvalidRegion(_))
            ));
        });
    }

    #[test]
    fn private_zone_flag_values() {
        for (value, expected) in [
            (Some("1"), true),
            (Some("yes"), true),
            (Some("0"), false),
            (Some("false"), false),
            (Some(""), false),
            (None, false),
        ] {
            temp_env::with_var(PRIVATE_ZONE_ENV, value, || {
                assert_eq!(private_zone_from_env(), expected);
            });
        }
    }

    #[test]
    fn kind_parse_and_display() {
        assert_eq!("PAY".parse::<ServiceKind>().unwrap(), ServiceKind::Pay);
        assert_eq!(ServiceKind::Service.to_string(), "service");
        assert!("billing".parse::<ServiceKind>().is_err());
    }
}
