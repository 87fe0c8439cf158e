use metrics::{describe_counter, describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "telescope_reconstruction_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1);
}

pub fn describe_metrics() {
    describe_counter!(
        metric_names::EVENTS_PROCESSED,
        metrics::Unit::Count,
        "Number of events processed"
    );
    describe_counter!(
        metric_names::PARTICLES_IDENTIFIED,
        metrics::Unit::Count,
        "Number of particle identification attempts, by final quality code"
    );
    describe_counter!(
        metric_names::PARTICLES_CALIBRATED,
        metrics::Unit::Count,
        "Number of particle calibrations, by energy quality"
    );
    describe_counter!(
        metric_names::FAILURES,
        metrics::Unit::Count,
        "Number of failures encountered"
    );
}

pub mod metric_names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "telescope_reconstruction_";

    pub const EVENTS_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "events_processed");
    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const PARTICLES_CALIBRATED: &str = concatcp!(METRIC_NAME_PREFIX, "particles_calibrated");
    pub const PARTICLES_IDENTIFIED: &str = concatcp!(METRIC_NAME_PREFIX, "particles_identified");
}

pub mod identification_codes {
    // Label building function
    pub fn get_label(code: Option<u8>) -> (&'static str, String) {
        (
            "code",
            code.map(|code| code.to_string())
                .unwrap_or_else(|| "none".to_owned()),
        )
    }
}

pub mod energy_qualities {
    // Label building function
    pub fn get_label(quality: u8) -> (&'static str, &'static str) {
        (
            "energy_quality",
            match quality {
                0 => "not_calibrated",
                1 => "measured",
                2 => "calculated",
                3 => "punch_through",
                4 => "incoherent",
                _ => "unknown",
            },
        )
    }
}

pub mod failures {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        EventFileUnreadable,
        EventFileMalformed,
        OutputWriteFailed,
        UnknownLayer,
        UnknownTelescope,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::EventFileUnreadable => "event_file_unreadable",
                FailureKind::EventFileMalformed => "event_file_malformed",
                FailureKind::OutputWriteFailed => "output_write_failed",
                FailureKind::UnknownLayer => "unknown_layer",
                FailureKind::UnknownTelescope => "unknown_telescope",
            },
        )
    }
}
