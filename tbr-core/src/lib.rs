//! Thread border router core: infrastructure-link RA tracking and the
//! compact SRP Update codec.
//! Host-driven: no I/O; the host passes packets and the current time in,
//! polls the next deadline and drains events.

pub mod infra;
pub mod ip6;
pub mod nd;
pub mod netdata;
pub mod rs_sender;
pub mod rx_ra_tracker;
pub mod srp_coder;
pub mod time;

pub use infra::{InfraIf, RoutingContext, SendError, StaticRoutingContext};
pub use ip6::Prefix;
pub use netdata::{LowpanContext, NetworkData, OnMeshPrefixConfig, StaticNetworkData};
pub use rs_sender::BorderRoutingCounters;
pub use rx_ra_tracker::{RxRaTracker, TrackerConfig, TrackerEvent};
pub use srp_coder::{decode as decode_srp, encode_update as encode_srp_update, CoderError, MsgEncoder, SrpUpdate};
pub use time::TimeMilli;
