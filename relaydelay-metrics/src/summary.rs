use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{LabelPair, Metric, MetricFamily, MetricType, Quantile, Summary};
use relaydelay_config::Objective;

/// Observations of a single label combination.
#[derive(Debug, Default)]
struct Series {
    /// The most recent samples, oldest first.
    window: VecDeque<f64>,
    count: u64,
    sum: f64,
}

#[derive(Debug)]
struct SummaryInner {
    desc: Desc,
    objectives: Vec<Objective>,
    window: usize,
    series: Mutex<BTreeMap<Vec<String>, Series>>,
}

/// A label-partitioned summary with quantiles over a sliding window.
///
/// The `prometheus` crate ships no summary type, so this implements [`Collector`] directly.
/// Quantiles are computed exactly over the `window` most recent samples of each label
/// combination. `_count` and `_sum` are cumulative over the lifetime of the process. The error
/// tolerance of an objective is carried for documentation only, since exact ranks never exceed it.
#[derive(Clone, Debug)]
pub struct SummaryVec {
    inner: Arc<SummaryInner>,
}

impl SummaryVec {
    /// Creates a summary with the fully qualified `name`.
    pub fn new(
        name: &str,
        help: &str,
        label_names: &[&str],
        objectives: &[Objective],
        window: usize,
    ) -> prometheus::Result<Self> {
        let desc = Desc::new(
            name.to_owned(),
            help.to_owned(),
            label_names.iter().map(|&l| l.to_owned()).collect(),
            HashMap::new(),
        )?;

        let mut objectives = objectives.to_vec();
        objectives.sort_by(|a, b| a.quantile.total_cmp(&b.quantile));

        Ok(Self {
            inner: Arc::new(SummaryInner {
                desc,
                objectives,
                window: window.max(1),
                series: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    /// Adds a sample to the series identified by `label_values`.
    ///
    /// The label values must be given in the order of the label names passed to [`new`](Self::new).
    pub fn observe(&self, label_values: &[&str], value: f64) {
        let key = label_values.iter().map(|&v| v.to_owned()).collect();

        let mut series = self.inner.series.lock();
        let series = series.entry(key).or_default();

        if series.window.len() == self.inner.window {
            series.window.pop_front();
        }
        series.window.push_back(value);
        series.count += 1;
        series.sum += value;
    }

    /// Returns the current value of `quantile` for a series, if it has samples.
    #[cfg(test)]
    fn quantile(&self, label_values: &[&str], quantile: f64) -> Option<f64> {
        let series = self.inner.series.lock();
        let key: Vec<String> = label_values.iter().map(|&v| v.to_owned()).collect();
        let sorted = sorted_samples(&series.get(&key)?.window);
        Some(nearest_rank(&sorted, quantile))
    }

    fn metric(&self, label_values: &[String], series: &Series) -> Metric {
        let sorted = sorted_samples(&series.window);

        let mut summary = Summary::default();
        summary.set_sample_count(series.count);
        summary.set_sample_sum(series.sum);
        for objective in &self.inner.objectives {
            let mut quantile = Quantile::default();
            quantile.set_quantile(objective.quantile);
            quantile.set_value(nearest_rank(&sorted, objective.quantile));
            summary.mut_quantile().push(quantile);
        }

        let mut metric = Metric::default();
        for (name, value) in self.inner.desc.variable_labels.iter().zip(label_values) {
            let mut label = LabelPair::default();
            label.set_name(name.clone());
            label.set_value(value.clone());
            metric.mut_label().push(label);
        }
        metric.set_summary(summary);
        metric
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut family = MetricFamily::default();
        family.set_name(self.inner.desc.fq_name.clone());
        family.set_help(self.inner.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);

        let series = self.inner.series.lock();
        for (label_values, series) in series.iter() {
            family.mut_metric().push(self.metric(label_values, series));
        }

        vec![family]
    }
}

fn sorted_samples(window: &VecDeque<f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Returns the sample at the nearest rank of `quantile`, or NaN for no samples.
fn nearest_rank(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, Registry, TextEncoder};
    use similar_asserts::assert_eq;

    use super::*;

    fn objectives() -> Vec<Objective> {
        [0.9, 0.5]
            .into_iter()
            .map(|quantile| Objective {
                quantile,
                error: 0.01,
            })
            .collect()
    }

    #[test]
    fn test_nearest_rank() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(nearest_rank(&sorted, 0.5), 5.0);
        assert_eq!(nearest_rank(&sorted, 0.9), 9.0);
        assert_eq!(nearest_rank(&sorted, 0.99), 10.0);
        assert_eq!(nearest_rank(&sorted, 0.01), 1.0);
        assert!(nearest_rank(&[], 0.5).is_nan());
    }

    #[test]
    fn test_sliding_window() {
        let summary = SummaryVec::new("test_summary", "help", &["IP"], &objectives(), 3).unwrap();

        for value in [100.0, 1.0, 2.0, 3.0] {
            summary.observe(&["10.0.0.1"], value);
        }

        // The first sample left the window, but is still part of count and sum.
        assert_eq!(summary.quantile(&["10.0.0.1"], 0.9), Some(3.0));
        assert_eq!(summary.quantile(&["10.0.0.1"], 0.5), Some(2.0));
        assert_eq!(summary.quantile(&["10.0.0.2"], 0.5), None);

        let families = summary.collect();
        let metric = &families[0].get_metric()[0];
        assert_eq!(metric.get_summary().get_sample_count(), 4);
        assert_eq!(metric.get_summary().get_sample_sum(), 106.0);
    }

    #[test]
    fn test_text_exposition() {
        let registry = Registry::new();
        let summary = SummaryVec::new(
            "relaydelay_Summary_relay",
            "nodes",
            &["IP", "RelayId"],
            &objectives(),
            16,
        )
        .unwrap();
        registry.register(Box::new(summary.clone())).unwrap();

        summary.observe(&["10.0.0.1", "1"], 37.0);
        summary.observe(&["10.0.0.1", "1"], 41.0);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();

        insta::assert_snapshot!(String::from_utf8(buffer).unwrap(), @r#"
        # HELP relaydelay_Summary_relay nodes
        # TYPE relaydelay_Summary_relay summary
        relaydelay_Summary_relay{IP="10.0.0.1",RelayId="1",quantile="0.5"} 37
        relaydelay_Summary_relay{IP="10.0.0.1",RelayId="1",quantile="0.9"} 41
        relaydelay_Summary_relay_sum{IP="10.0.0.1",RelayId="1"} 78
        relaydelay_Summary_relay_count{IP="10.0.0.1",RelayId="1"} 2
        "#);
    }
}
