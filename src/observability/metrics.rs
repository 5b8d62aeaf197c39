use std::time::Instant;

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub trip_operations_total: IntCounterVec,
    pub trip_operation_latency_seconds: HistogramVec,
    pub active_trips: IntGauge,
    pub vehicle_weight_utilization: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let trip_operations_total = IntCounterVec::new(
            Opts::new(
                "trip_operations_total",
                "Trip engine operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid trip_operations_total metric");

        let trip_operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "trip_operation_latency_seconds",
                "Latency of trip engine operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid trip_operation_latency_seconds metric");

        let active_trips = IntGauge::new("active_trips", "Trips that are planned or in progress")
            .expect("valid active_trips metric");

        let vehicle_weight_utilization = GaugeVec::new(
            Opts::new(
                "vehicle_weight_utilization",
                "Weight utilization of a vehicle's latest trip [0..1]",
            ),
            &["vehicle_id"],
        )
        .expect("valid vehicle_weight_utilization metric");

        registry
            .register(Box::new(trip_operations_total.clone()))
            .expect("register trip_operations_total");
        registry
            .register(Box::new(trip_operation_latency_seconds.clone()))
            .expect("register trip_operation_latency_seconds");
        registry
            .register(Box::new(active_trips.clone()))
            .expect("register active_trips");
        registry
            .register(Box::new(vehicle_weight_utilization.clone()))
            .expect("register vehicle_weight_utilization");

        Self {
            registry,
            trip_operations_total,
            trip_operation_latency_seconds,
            active_trips,
            vehicle_weight_utilization,
        }
    }

    pub fn observe_operation<T>(
        &self,
        operation: &str,
        started: Instant,
        result: &Result<T, EngineError>,
    ) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => err.outcome_label(),
        };

        self.trip_operation_latency_seconds
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
        self.trip_operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_utilization(&self, vehicle_id: Uuid, total_weight: f64, capacity_weight: f64) {
        let utilization = if capacity_weight > 0.0 {
            (total_weight / capacity_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        self.vehicle_weight_utilization
            .with_label_values(&[&vehicle_id.to_string()])
            .set(utilization);
    }

    /// Drops the series of a vehicle that no longer carries an active trip.
    pub fn clear_utilization(&self, vehicle_id: Uuid) {
        // Absent series are fine.
        let _ = self
            .vehicle_weight_utilization
            .remove_label_values(&[&vehicle_id.to_string()]);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use uuid::Uuid;

    use super::Metrics;
    use crate::error::EngineError;

    #[test]
    fn operation_outcomes_are_labelled() {
        let metrics = Metrics::new();
        let failed: Result<(), EngineError> = Err(EngineError::validation("bad input"));

        metrics.observe_operation("create_trip", Instant::now(), &Ok::<(), EngineError>(()));
        metrics.observe_operation("create_trip", Instant::now(), &failed);

        assert_eq!(
            metrics
                .trip_operations_total
                .with_label_values(&["create_trip", "success"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .trip_operations_total
                .with_label_values(&["create_trip", "validation"])
                .get(),
            1
        );
    }

    #[test]
    fn utilization_is_clamped() {
        let metrics = Metrics::new();
        let vehicle = Uuid::from_u128(3);

        metrics.record_utilization(vehicle, 150.0, 100.0);
        assert_eq!(
            metrics
                .vehicle_weight_utilization
                .with_label_values(&[&vehicle.to_string()])
                .get(),
            1.0
        );

        metrics.record_utilization(vehicle, 5.0, 0.0);
        assert_eq!(
            metrics
                .vehicle_weight_utilization
                .with_label_values(&[&vehicle.to_string()])
                .get(),
            0.0
        );
    }

    #[test]
    fn cleared_vehicle_drops_out_of_exposition() {
        let metrics = Metrics::new();
        let vehicle = Uuid::from_u128(4);

        metrics.record_utilization(vehicle, 40.0, 100.0);
        assert!(metrics.encode().unwrap().contains(&vehicle.to_string()));

        metrics.clear_utilization(vehicle);
        metrics.clear_utilization(vehicle);
        assert!(!metrics.encode().unwrap().contains(&vehicle.to_string()));
    }

    #[test]
    fn encodes_registered_families() {
        let metrics = Metrics::new();
        metrics.active_trips.set(2);

        let body = metrics.encode().unwrap();
        assert!(body.contains("active_trips 2"));
    }
}
