//! Binds a decoded report to the feed that judges it.
//!
//! Resolution order:
//! 1. exact `query_id` match against a configured feed
//! 2. type-only configured feed: a source is rebuilt from the report's own
//!    parameters for this evaluation only; the feed itself is untouched
//! 3. synthesis for catalog queries and auto-sourceable types, judged at the
//!    global confidence threshold (alert-only, never disputed)
//!
//! Always-alert query types skip matching entirely.

use crate::evaluator::Threshold;
use crate::feeds::{catalog, MonitoredFeed, SourceRegistry, TrustedValueSource};
use crate::query::DecodedQuery;

use alloy::primitives::B256;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOrigin {
    QueryId,
    QueryType,
    Synthesized,
}

/// An immutable (source, threshold) pair valid for one report.
#[derive(Clone)]
pub struct Binding {
    pub source: Arc<dyn TrustedValueSource>,
    pub threshold: Threshold,
    pub origin: BindingOrigin,
}

impl Binding {
    /// Only operator-configured feeds may lead to an on-chain dispute.
    pub fn dispute_eligible(&self) -> bool {
        self.origin != BindingOrigin::Synthesized
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("source", &self.source.describe())
            .field("threshold", &self.threshold)
            .field("origin", &self.origin)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// Protocol-critical submission: flag immediately, no comparison.
    AlwaysAlert,
    Bound(Binding),
    /// No feed and nothing to synthesize from; processing halts.
    Unmatched,
}

pub fn match_feed(
    query_id: B256,
    query: &DecodedQuery,
    feeds: &[MonitoredFeed],
    registry: &SourceRegistry,
    confidence_threshold: f64,
) -> MatchOutcome {
    if query.capabilities.always_alert {
        return MatchOutcome::AlwaysAlert;
    }

    let by_id = feeds
        .iter()
        .find(|f| f.query_id == Some(query_id))
        .and_then(|f| f.source.clone().map(|source| (source, f.threshold)));
    if let Some((source, threshold)) = by_id {
        debug!(query_id = %query_id, "matched configured feed by id");
        return MatchOutcome::Bound(Binding {
            source,
            threshold,
            origin: BindingOrigin::QueryId,
        });
    }

    if let Some(feed) = feeds
        .iter()
        .find(|f| f.is_type_only() && f.query_type == query.type_name())
    {
        match registry.for_query(query) {
            Some(source) => {
                debug!(query_type = %feed.query_type, "bound type-only feed");
                return MatchOutcome::Bound(Binding {
                    source,
                    threshold: feed.threshold,
                    origin: BindingOrigin::QueryType,
                });
            }
            None => warn!(query_type = %feed.query_type, "type-only feed could not bind report parameters"),
        }
    }

    let in_catalog = catalog::find_by_id(query_id).is_some();
    if !in_catalog && !query.capabilities.auto_sourceable {
        info!(query_id = %query_id, query_type = query.type_name(), "no feed for query");
        return MatchOutcome::Unmatched;
    }

    let threshold = if query.codec.is_numeric() {
        match Threshold::percentage(confidence_threshold) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "invalid confidence threshold");
                return MatchOutcome::Unmatched;
            }
        }
    } else {
        Threshold::equality()
    };

    match registry.for_query(query) {
        Some(source) => MatchOutcome::Bound(Binding {
            source,
            threshold,
            origin: BindingOrigin::Synthesized,
        }),
        None => MatchOutcome::Unmatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Metric;
    use crate::feeds::tests::StaticSource;
    use crate::query::{decode_query, encode_query, query_id, QueryKind};
    use alloy::dyn_abi::DynSolValue;
    use std::collections::HashMap;
    use std::time::Duration;

    fn registry() -> SourceRegistry {
        SourceRegistry::new(HashMap::new(), Duration::from_secs(1)).unwrap()
    }

    fn decoded(kind: QueryKind) -> (B256, DecodedQuery) {
        let data = encode_query(&kind).unwrap();
        let q = decode_query(&data).unwrap();
        (query_id(&q.kind, &data), q)
    }

    fn spot(asset: &str) -> QueryKind {
        QueryKind::SpotPrice {
            asset: asset.into(),
            currency: "usd".into(),
        }
    }

    #[test]
    fn test_exact_id_wins() {
        let (id, q) = decoded(spot("eth"));
        let feeds = vec![MonitoredFeed {
            query_id: Some(id),
            query_type: "SpotPrice".into(),
            source: Some(Arc::new(StaticSource::new(None))),
            threshold: Threshold::new(Metric::Range, Some(3.0)).unwrap(),
        }];
        match match_feed(id, &q, &feeds, &registry(), 0.1) {
            MatchOutcome::Bound(b) => {
                assert_eq!(b.origin, BindingOrigin::QueryId);
                assert_eq!(b.threshold.metric(), Metric::Range);
                assert_eq!(b.source.describe(), "static");
                assert!(b.dispute_eligible());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_type_only_feed_rebinds_per_report() {
        let feeds = vec![MonitoredFeed {
            query_id: None,
            query_type: "SpotPrice".into(),
            source: None,
            threshold: Threshold::percentage(0.5).unwrap(),
        }];
        let (id, q) = decoded(spot("doge"));
        match match_feed(id, &q, &feeds, &registry(), 0.1) {
            MatchOutcome::Bound(b) => {
                assert_eq!(b.origin, BindingOrigin::QueryType);
                assert_eq!(b.source.describe(), "spot DOGE/USD");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(feeds[0].source.is_none());
    }

    #[test]
    fn test_synthesized_feeds_use_confidence_threshold() {
        let (id, q) = decoded(spot("btc"));
        match match_feed(id, &q, &[], &registry(), 0.2) {
            MatchOutcome::Bound(b) => {
                assert_eq!(b.origin, BindingOrigin::Synthesized);
                assert_eq!(b.threshold.amount(), Some(0.2));
                assert!(!b.dispute_eligible());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_always_alert_and_unmatched() {
        let (id, q) = decoded(QueryKind::Custom {
            type_name: "TellorOracleAddress".into(),
            params: vec![("V".into(), DynSolValue::Bytes(vec![]))],
        });
        assert!(matches!(
            match_feed(id, &q, &[], &registry(), 0.1),
            MatchOutcome::AlwaysAlert
        ));

        let (id, q) = decoded(QueryKind::Custom {
            type_name: "StringQuery".into(),
            params: vec![("text".into(), DynSolValue::String("gm".into()))],
        });
        assert!(matches!(
            match_feed(id, &q, &[], &registry(), 0.1),
            MatchOutcome::Unmatched
        ));
    }
}
