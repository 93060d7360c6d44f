use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters exported at `/metrics`.
pub struct Metrics {
    registry: Registry,
    pub tickets_issued: IntCounterVec,
    pub seats_failed: IntCounterVec,
    pub ticket_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tickets_issued = IntCounterVec::new(
            Opts::new("busline_tickets_issued_total", "Tickets issued, by sale mode"),
            &["mode"],
        )?;
        let seats_failed = IntCounterVec::new(
            Opts::new("busline_issue_failures_total", "Seats that could not be sold, by reason"),
            &["reason"],
        )?;
        let ticket_transitions = IntCounterVec::new(
            Opts::new("busline_ticket_transitions_total", "Ticket status changes, by target status"),
            &["to"],
        )?;

        registry.register(Box::new(tickets_issued.clone()))?;
        registry.register(Box::new(seats_failed.clone()))?;
        registry.register(Box::new(ticket_transitions.clone()))?;

        Ok(Self { registry, tickets_issued, seats_failed, ticket_transitions })
    }

    pub fn render(&self) -> Result<String, anyhow::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.tickets_issued.with_label_values(&["COUNTER"]).inc_by(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("busline_tickets_issued_total{mode=\"COUNTER\"} 2"));
    }
}
