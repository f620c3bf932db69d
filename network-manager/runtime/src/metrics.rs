use kube_network_manager_cache::{Cache, CacheKind};
use kube_network_manager_core::{ChangeType, ResourceKind, VncKind};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    events: Family<EventLabels, Counter>,
    event_errors: Family<EventLabels, Counter>,
    unknown_kinds: Family<KindLabels, Counter>,
    timer_resyncs: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabels {
    kind: String,
    change_type: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

#[derive(Debug)]
struct CacheSize {
    kube: Cache<ResourceKind>,
    vnc: Cache<VncKind>,
}

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let events = Family::default();
        reg.register("events", "Count of events dequeued", events.clone());

        let event_errors = Family::default();
        reg.register(
            "event_errors",
            "Count of events whose handling failed",
            event_errors.clone(),
        );

        let unknown_kinds = Family::default();
        reg.register(
            "unknown_kind",
            "Count of events of kinds without a resource manager",
            unknown_kinds.clone(),
        );

        let timer_resyncs = Family::default();
        reg.register(
            "timer_resyncs",
            "Count of periodic resyncs per kind",
            timer_resyncs.clone(),
        );

        Self {
            events,
            event_errors,
            unknown_kinds,
            timer_resyncs,
        }
    }

    pub fn event(&self, kind: &str, change: ChangeType) {
        self.events
            .get_or_create(&EventLabels::new(kind, change))
            .inc();
        if change == ChangeType::Sync {
            self.timer_resyncs
                .get_or_create(&KindLabels {
                    kind: kind.to_string(),
                })
                .inc();
        }
    }

    pub fn event_error(&self, kind: &str, change: ChangeType) {
        self.event_errors
            .get_or_create(&EventLabels::new(kind, change))
            .inc();
    }

    pub fn unknown_kind(&self, kind: &str) {
        self.unknown_kinds
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn events_of(&self, kind: &str, change: ChangeType) -> u64 {
        self.events.get_or_create(&EventLabels::new(kind, change)).get()
    }

    #[cfg(test)]
    pub(crate) fn errors_of(&self, kind: &str, change: ChangeType) -> u64 {
        self.event_errors
            .get_or_create(&EventLabels::new(kind, change))
            .get()
    }

    #[cfg(test)]
    pub(crate) fn unknown_of(&self, kind: &str) -> u64 {
        self.unknown_kinds
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .get()
    }
}

impl EventLabels {
    fn new(kind: &str, change: ChangeType) -> Self {
        Self {
            kind: kind.to_string(),
            change_type: change.as_str(),
        }
    }
}

/// Exports the number of cached objects per kind.
pub fn register_cache_size(reg: &mut Registry, kube: Cache<ResourceKind>, vnc: Cache<VncKind>) {
    reg.register_collector(Box::new(CacheSize { kube, vnc }));
}

impl Collector for CacheSize {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let mut kube_encoder = encoder.encode_descriptor(
            "kube_object_cache_size",
            "The number of cached Kubernetes objects",
            None,
            MetricType::Gauge,
        )?;
        encode_sizes(&self.kube, |k| k.as_str(), &mut kube_encoder)?;

        let mut vnc_encoder = encoder.encode_descriptor(
            "vnc_object_cache_size",
            "The number of cached network controller objects",
            None,
            MetricType::Gauge,
        )?;
        encode_sizes(&self.vnc, |k| k.as_str(), &mut vnc_encoder)?;

        Ok(())
    }
}

fn encode_sizes<K: CacheKind>(
    cache: &Cache<K>,
    name: impl Fn(K) -> &'static str,
    encoder: &mut prometheus_client::encoding::MetricEncoder<'_>,
) -> Result<(), std::fmt::Error> {
    for kind in cache.kinds() {
        let labels = vec![("kind", name(kind))];
        let size = ConstGauge::new(cache.len(kind) as u32);
        size.encode(encoder.encode_family(&labels)?)?;
    }
    Ok(())
}
