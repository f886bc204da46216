//! Result Aggregator (C8): three de-duplicated collections keyed by the identities in the
//! data model, generalising `output/results_manager.rs::calculate_statistics`'s merge-then-sort
//! shape onto Endpoints/Forms/ParameterSets instead of a single flat event list.

use std::collections::BTreeSet;

use dashmap::DashMap;

use crate::model::{Endpoint, Form, Method, ParameterSet};
use crate::normalize;

#[derive(Default)]
pub struct Aggregator {
    endpoints: DashMap<(Method, String), Endpoint>,
    forms: DashMap<(Method, String, Vec<String>), Form>,
    parameters: DashMap<(Method, String, Vec<String>), ParameterSet>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one endpoint in: union of sources, min depth, retained max-status information.
    pub fn record_endpoint(&self, endpoint: Endpoint) {
        let key = endpoint.key();
        self.endpoints
            .entry(key)
            .and_modify(|existing| {
                existing.sources = existing
                    .sources
                    .union(&endpoint.sources)
                    .cloned()
                    .collect::<BTreeSet<_>>();
                existing.depth = existing.depth.min(endpoint.depth);
                if endpoint.status.is_some() {
                    existing.status = match (existing.status, endpoint.status) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        (None, Some(b)) => Some(b),
                        (a, None) => a,
                    };
                }
                if existing.content_type.is_none() {
                    existing.content_type = endpoint.content_type.clone();
                }
            })
            .or_insert(endpoint);
    }

    pub fn record_form(&self, form: Form) {
        let key = form.key();
        self.forms.entry(key).or_insert(form);
    }

    pub fn record_parameter_set(&self, params: ParameterSet) {
        let url_key = normalize::url_without_query(&params.url);
        let key = params.key(&url_key);
        self.parameters
            .entry(key)
            .and_modify(|existing| {
                for (name, value) in &params.parameters {
                    existing
                        .parameters
                        .entry(name.clone())
                        .or_insert_with(|| value.clone());
                }
            })
            .or_insert(params);
    }

    /// Snapshot everything, sorted per spec.md §4.8: endpoints by (depth, url); forms by
    /// (action_url, method); parameter-sets by (url, method). Takes `&self` (rather than
    /// consuming) so the aggregator can be finalised through a shared `Arc` without having
    /// to prove it is the last reference.
    pub fn finalise(&self) -> (Vec<Endpoint>, Vec<Form>, Vec<ParameterSet>) {
        let mut endpoints: Vec<Endpoint> = self.endpoints.iter().map(|e| e.value().clone()).collect();
        endpoints.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));

        let mut forms: Vec<Form> = self.forms.iter().map(|e| e.value().clone()).collect();
        forms.sort_by(|a, b| {
            a.action_url
                .cmp(&b.action_url)
                .then_with(|| a.method.cmp(&b.method))
        });

        let mut parameters: Vec<ParameterSet> = self.parameters.iter().map(|e| e.value().clone()).collect();
        parameters.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| a.method.cmp(&b.method)));

        (endpoints, forms, parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointSource;

    #[test]
    fn duplicate_endpoint_unions_sources_and_keeps_min_depth() {
        let agg = Aggregator::new();
        agg.record_endpoint(Endpoint::new(
            "https://h/a".to_string(),
            Method::Get,
            EndpointSource::HtmlA,
            3,
        ));
        agg.record_endpoint(Endpoint::new(
            "https://h/a".to_string(),
            Method::Get,
            EndpointSource::InlineJs,
            1,
        ));
        let (endpoints, _, _) = agg.finalise();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].depth, 1);
        assert_eq!(endpoints[0].sources.len(), 2);
    }

    #[test]
    fn endpoints_sorted_by_depth_then_url() {
        let agg = Aggregator::new();
        agg.record_endpoint(Endpoint::new("https://h/z".to_string(), Method::Get, EndpointSource::HtmlA, 0));
        agg.record_endpoint(Endpoint::new("https://h/a".to_string(), Method::Get, EndpointSource::HtmlA, 1));
        agg.record_endpoint(Endpoint::new("https://h/b".to_string(), Method::Get, EndpointSource::HtmlA, 0));
        let (endpoints, _, _) = agg.finalise();
        let urls: Vec<&str> = endpoints.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://h/b", "https://h/z", "https://h/a"]);
    }

    #[test]
    fn parameter_sets_merge_by_url_without_query() {
        let agg = Aggregator::new();
        agg.record_parameter_set(ParameterSet {
            url: "https://h/search?q=1".to_string(),
            method: Method::Get,
            parameters: [("q".to_string(), "1".to_string())].into_iter().collect(),
            source: crate::model::ParameterSource::Query,
        });
        let (_, _, params) = agg.finalise();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].url, "https://h/search?q=1");
    }
}
