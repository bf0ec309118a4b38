//! `persona health`: active probe plus the health counters it updates.

use crate::runtime::Runtime;
use persona_telemetry::HealthReport;

pub async fn run(owner: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load_without_knowledge()?;

    let report = match owner {
        Some(owner) => runtime.assistant.health_check_for(owner).await?,
        None => runtime.assistant.health_check().await,
    };

    match &report {
        HealthReport::Healthy {
            model,
            response_time_ms,
        } => println!("✅ {model} responded in {response_time_ms} ms"),
        HealthReport::Unhealthy { model, error } => println!("❌ {model}: {error}"),
    }

    let health = runtime.assistant.health();
    println!();
    println!("  Requests:              {}", health.total_requests);
    println!("  Successful:            {}", health.successful_requests);
    println!("  Consecutive failures:  {}", health.consecutive_failures);
    println!("  Avg response time:     {:.0} ms", health.average_response_time_ms);
    println!("  Healthy:               {}", health.is_healthy);

    if !report.is_healthy() {
        return Err("health probe failed".into());
    }
    Ok(())
}
