use std::sync::Arc;

use crate::{
    errors::ConfigError,
    options::AugureOptions,
    report::{ReportProvider, ga::AnalyticsClient},
};

/// Where navigation reports come from, once the options have been validated.
#[derive(Clone)]
pub enum ReportSource {
    Analytics {
        view_id: String,
        client: Option<Arc<dyn AnalyticsClient>>,
    },
    Custom(Arc<dyn ReportProvider>),
}

/// Checks the options once, at construction, and returns the report source they describe.
pub fn validate(options: &AugureOptions) -> Result<ReportSource, ConfigError> {
    let view_id = options.ga.as_deref().filter(|ga| !ga.trim().is_empty());

    let source = match (view_id, &options.report_provider) {
        (Some(_), Some(_)) => return Err(ConfigError::AmbiguousReportSource),
        (None, None) => return Err(ConfigError::MissingReportSource),
        (Some(view_id), None) => ReportSource::Analytics {
            view_id: view_id.to_string(),
            client: options.analytics_client.clone(),
        },
        (None, Some(provider)) => ReportSource::Custom(provider.clone()),
    };

    let prefetch_config = &options.runtime.prefetch_config;
    for (name, value) in prefetch_config.thresholds() {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::InvalidThreshold { name, value });
        }
    }

    if !prefetch_config.min_weight.is_finite() || prefetch_config.min_weight < 0.0 {
        return Err(ConfigError::InvalidMinWeight(prefetch_config.min_weight));
    }

    if prefetch_config.max_targets == 0 {
        return Err(ConfigError::InvalidMaxTargets);
    }

    if let Some(period) = &options.period
        && period.start > period.end
    {
        return Err(ConfigError::InvalidPeriod {
            start: period.start.to_string(),
            end: period.end.to_string(),
        });
    }

    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::BoxError, graph::ReportGraph, options::Period};
    use chrono::NaiveDate;

    fn custom_provider() -> Arc<dyn ReportProvider> {
        Arc::new(|| async { Ok::<_, BoxError>(ReportGraph::new()) })
    }

    #[test]
    fn test_both_sources_are_rejected() {
        let options = AugureOptions {
            ga: Some("view-1".into()),
            report_provider: Some(custom_provider()),
            ..Default::default()
        };

        assert!(matches!(
            validate(&options),
            Err(ConfigError::AmbiguousReportSource)
        ));
    }

    #[test]
    fn test_missing_source_is_rejected() {
        assert!(matches!(
            validate(&AugureOptions::default()),
            Err(ConfigError::MissingReportSource)
        ));

        let blank_view = AugureOptions {
            ga: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            validate(&blank_view),
            Err(ConfigError::MissingReportSource)
        ));
    }

    #[test]
    fn test_single_source_is_accepted() {
        let analytics = AugureOptions {
            ga: Some("view-1".into()),
            ..Default::default()
        };
        assert!(matches!(
            validate(&analytics),
            Ok(ReportSource::Analytics { view_id, .. }) if view_id == "view-1"
        ));

        let custom = AugureOptions {
            report_provider: Some(custom_provider()),
            ..Default::default()
        };
        assert!(matches!(validate(&custom), Ok(ReportSource::Custom(_))));
    }

    #[test]
    fn test_invalid_prefetch_config_is_rejected() {
        let mut options = AugureOptions {
            ga: Some("view-1".into()),
            ..Default::default()
        };
        options.runtime.prefetch_config.three_g = 1.5;
        assert!(matches!(
            validate(&options),
            Err(ConfigError::InvalidThreshold { name: "3g", .. })
        ));

        options.runtime.prefetch_config.three_g = 0.3;
        options.runtime.prefetch_config.max_targets = 0;
        assert!(matches!(
            validate(&options),
            Err(ConfigError::InvalidMaxTargets)
        ));

        options.runtime.prefetch_config.max_targets = 3;
        options.runtime.prefetch_config.min_weight = -1.0;
        assert!(matches!(
            validate(&options),
            Err(ConfigError::InvalidMinWeight(_))
        ));
    }

    #[test]
    fn test_inverted_period_is_rejected() {
        let options = AugureOptions {
            ga: Some("view-1".into()),
            period: Some(Period {
                start: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            }),
            ..Default::default()
        };

        assert!(matches!(
            validate(&options),
            Err(ConfigError::InvalidPeriod { .. })
        ));
    }
}
