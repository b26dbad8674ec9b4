//! Demo signup and purchase funnel replayed by `tagrelay simulate`

use clap::ValueEnum;
use tagrelay_core::{EventParams, Timestamp};

/// Pricing plan offered on the demo page
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn id(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Monthly price in USD
    pub fn price(&self) -> u32 {
        match self {
            Plan::Free => 0,
            Plan::Pro => 29,
            Plan::Enterprise => 99,
        }
    }
}

pub const FEATURES: [&str; 3] = ["upload", "share", "export"];

/// One scripted user action
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelStep {
    pub name: &'static str,
    pub params: EventParams,
}

impl FunnelStep {
    fn new(name: &'static str, params: EventParams) -> Self {
        Self { name, params }
    }
}

/// A visitor who browses pricing, signs up by email and buys `plan`
pub fn demo_funnel(plan: Plan, now: Timestamp) -> Vec<FunnelStep> {
    let method = "email";
    let initial = Plan::Free;

    let mut steps = vec![
        FunnelStep::new("view_pricing", EventParams::new().with("plan_id", initial.id())),
        FunnelStep::new(
            "start_signup",
            EventParams::new()
                .with("method", method)
                .with("plan_id", initial.id()),
        ),
        FunnelStep::new(
            "sign_up",
            EventParams::new()
                .with("method", method)
                .with("plan_id", initial.id()),
        ),
        FunnelStep::new(
            "login",
            EventParams::new()
                .with("method", method)
                .with("plan_id", initial.id()),
        ),
        FunnelStep::new("select_plan", EventParams::new().with("plan_id", plan.id())),
        FunnelStep::new(
            "begin_checkout",
            EventParams::new()
                .with("plan_id", plan.id())
                .with("value", plan.price())
                .with("currency", "USD"),
        ),
        FunnelStep::new(
            "purchase",
            EventParams::new()
                .with("plan_id", plan.id())
                .with("value", plan.price())
                .with("currency", "USD")
                .with("transaction_id", format!("demo-{}", now.as_millis())),
        ),
    ];

    // logged_in is sent as text, matching the page
    steps.extend(FEATURES.iter().map(|feature| {
        FunnelStep::new(
            "feature_use",
            EventParams::new()
                .with("feature_id", *feature)
                .with("plan_id", plan.id())
                .with("logged_in", "true"),
        )
    }));
    steps
}
