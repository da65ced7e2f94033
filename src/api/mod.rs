use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    EngineError, FlatRateSolveConfig, FlatRateSolveResult, InheritanceTerms, LifeIncomeResult,
    Persona, ReferenceSummary, ScenarioRegistry, ScenarioSummary, SimulationConfig, TaxClass,
    TaxDistribution, TaxPolicy, TaxScenario, YearlyResult, scenarios, solve_flat_rate,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliTaxClass {
    I,
    Ii,
    Iii,
}

impl From<CliTaxClass> for TaxClass {
    fn from(value: CliTaxClass) -> Self {
        match value {
            CliTaxClass::I => TaxClass::I,
            CliTaxClass::Ii => TaxClass::II,
            CliTaxClass::Iii => TaxClass::III,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
enum ApiTaxClass {
    #[serde(alias = "i", alias = "1")]
    I,
    #[serde(alias = "ii", alias = "2")]
    II,
    #[serde(alias = "iii", alias = "3")]
    III,
}

impl From<ApiTaxClass> for CliTaxClass {
    fn from(value: ApiTaxClass) -> Self {
        match value {
            ApiTaxClass::I => CliTaxClass::I,
            ApiTaxClass::II => CliTaxClass::Ii,
            ApiTaxClass::III => CliTaxClass::Iii,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    name: Option<String>,
    icon: Option<String>,
    current_age: Option<u32>,
    initial_age: Option<u32>,
    current_income: Option<f64>,
    savings_rate: Option<f64>,
    inheritance_age: Option<u32>,
    inheritance_amount: Option<f64>,

    horizon_age: Option<u32>,
    growth_rate: Option<f64>,
    income_growth_rate: Option<f64>,
    vat_rate: Option<f64>,
    vat_applicable_rate: Option<f64>,
    allow_negative_wealth: Option<bool>,

    tax_class: Option<ApiTaxClass>,
    company_share: Option<f64>,
    hardship_exception: Option<bool>,

    scenario: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ComparePayload {
    #[serde(flatten)]
    base: SimulatePayload,
    scenarios: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    #[serde(flatten)]
    base: SimulatePayload,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "lifetax",
    about = "Lifetime income, wealth and tax projection under alternative tax scenarios"
)]
pub struct Cli {
    #[arg(long, default_value = "Persona")]
    name: String,
    #[arg(long, default_value = "person")]
    icon: String,
    #[arg(long)]
    current_age: u32,
    #[arg(long, help = "First simulated age; defaults to current-age")]
    initial_age: Option<u32>,
    #[arg(long, help = "Gross annual income")]
    current_income: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Share of after-tax income saved, in percent"
    )]
    savings_rate: f64,
    #[arg(long, default_value_t = 60)]
    inheritance_age: u32,
    #[arg(long, default_value_t = 0.0)]
    inheritance_amount: f64,
    #[arg(long, default_value_t = 90, help = "Last simulated age (inclusive)")]
    horizon_age: u32,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Assumed annual return on wealth in percent"
    )]
    growth_rate: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual income growth in percent")]
    income_growth_rate: f64,
    #[arg(long, default_value_t = 19.0, help = "Standard VAT rate in percent")]
    vat_rate: f64,
    #[arg(
        long,
        default_value_t = 70.0,
        help = "Share of consumption that carries VAT, in percent"
    )]
    vat_applicable_rate: f64,
    #[arg(long, default_value_t = false)]
    allow_negative_wealth: bool,
    #[arg(long, value_enum, default_value_t = CliTaxClass::I)]
    tax_class: CliTaxClass,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Share of the inheritance held as company assets, in percent"
    )]
    company_share: f64,
    #[arg(long, default_value_t = false)]
    hardship_exception: bool,
    #[arg(
        long = "scenario",
        help = "Scenario id to run; repeat for a comparison. Defaults to all scenarios"
    )]
    scenarios: Vec<String>,
    #[arg(
        long,
        help = "Also solve the revenue-neutral flat rate against this scenario id"
    )]
    solve_flat_rate_against: Option<String>,
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Debug, Clone)]
struct SimulationRequest {
    persona: Persona,
    config: SimulationConfig,
    scenario_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse<'a> {
    scenario_id: &'a str,
    scenario_name: &'a str,
    /// VAT rate the run used, after any scenario override.
    vat_rate: f64,
    years: &'a [YearlyResult],
    distribution: TaxDistribution,
    lifetime_income: f64,
    effective_rate: f64,
    terminal_wealth: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareResponse {
    persona: Persona,
    results: BTreeMap<String, LifeIncomeResult>,
    summaries: Vec<ScenarioSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flat_rate: Option<FlatRateSolveResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenariosResponse<'a> {
    scenarios: &'a [TaxScenario],
    references: Vec<ReferenceSummary>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    registry: Arc<ScenarioRegistry>,
}

fn build_inputs(cli: &Cli) -> Result<SimulationRequest, String> {
    let initial_age = cli.initial_age.unwrap_or(cli.current_age);

    if initial_age > cli.current_age {
        return Err("--initial-age must be <= --current-age".to_string());
    }

    if cli.inheritance_age < initial_age {
        return Err("--inheritance-age must be >= --initial-age".to_string());
    }

    if cli.horizon_age < cli.current_age {
        return Err("--horizon-age must be >= --current-age".to_string());
    }

    if !cli.current_income.is_finite() || cli.current_income < 0.0 {
        return Err("--current-income must be >= 0".to_string());
    }

    if !cli.inheritance_amount.is_finite() || cli.inheritance_amount < 0.0 {
        return Err("--inheritance-amount must be >= 0".to_string());
    }

    for (name, value) in [
        ("--savings-rate", cli.savings_rate),
        ("--vat-rate", cli.vat_rate),
        ("--vat-applicable-rate", cli.vat_applicable_rate),
        ("--company-share", cli.company_share),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    for (name, value) in [
        ("--growth-rate", cli.growth_rate),
        ("--income-growth-rate", cli.income_growth_rate),
    ] {
        if !value.is_finite() || value <= -100.0 {
            return Err(format!("{name} must be > -100"));
        }
    }

    let persona = Persona {
        name: cli.name.clone(),
        icon: cli.icon.clone(),
        current_age: cli.current_age,
        initial_age,
        current_income: cli.current_income,
        savings_rate: cli.savings_rate / 100.0,
        inheritance_age: cli.inheritance_age,
        inheritance_amount: cli.inheritance_amount,
    };

    let config = SimulationConfig {
        horizon_age: cli.horizon_age,
        assumed_growth_rate: cli.growth_rate / 100.0,
        income_growth_rate: cli.income_growth_rate / 100.0,
        vat_rate: cli.vat_rate / 100.0,
        vat_applicable_rate: cli.vat_applicable_rate / 100.0,
        allow_negative_wealth: cli.allow_negative_wealth,
        inheritance: InheritanceTerms {
            tax_class: cli.tax_class.into(),
            company_share: cli.company_share / 100.0,
            hardship_exception: cli.hardship_exception,
        },
    };

    Ok(SimulationRequest {
        persona,
        config,
        scenario_ids: cli.scenarios.clone(),
    })
}

/// One-shot comparison for the command line; returns pretty JSON.
pub fn run_cli(cli: Cli) -> Result<String, String> {
    let registry = ScenarioRegistry::with_builtin().map_err(|e| e.to_string())?;
    let request = build_inputs(&cli)?;
    let scenario_ids = resolve_scenario_ids(&registry, request.scenario_ids.clone());

    let comparison = registry
        .run_comparison(&request.persona, &scenario_ids, &request.config)
        .map_err(|e| e.to_string())?;

    let flat_rate = match &cli.solve_flat_rate_against {
        Some(id) => {
            let reference = registry.get_scenario(id).map_err(|e| e.to_string())?;
            Some(
                solve_flat_rate(
                    &request.persona,
                    reference,
                    &request.config,
                    FlatRateSolveConfig::default(),
                )
                .map_err(|e| e.to_string())?,
            )
        }
        None => None,
    };

    let response = CompareResponse {
        persona: request.persona,
        summaries: comparison.summaries(),
        results: comparison.into_results(),
        flat_rate,
    };
    serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to encode output: {e}"))
}

fn resolve_scenario_ids(registry: &ScenarioRegistry, requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        registry
            .list_scenarios()
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    } else {
        requested
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let registry = ScenarioRegistry::with_builtin()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let state = AppState {
        registry: Arc::new(registry),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/scenarios", get(scenarios_handler))
        .route("/api/scenarios/:id", get(scenario_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/compare", post(compare_handler))
        .route("/api/solve-flat-rate", post(solve_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "lifetax HTTP API listening");
    info!("Local access: http://127.0.0.1:{port}/api/scenarios");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn scenarios_handler(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        ScenariosResponse {
            scenarios: state.registry.list_scenarios(),
            references: state.registry.reference_summaries(),
        },
    )
}

async fn scenario_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get_scenario(&id) {
        Ok(scenario) => json_response(StatusCode::OK, scenario),
        Err(err) => engine_error_response(&err),
    }
}

async fn simulate_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload)
}

async fn simulate_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload)
}

fn simulate_handler_impl(state: &AppState, payload: SimulatePayload) -> Response {
    let scenario_id = payload
        .scenario
        .clone()
        .unwrap_or_else(|| scenarios::STATUS_QUO_ID.to_string());
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return bad_request(&msg),
    };

    let scenario = match state.registry.get_scenario(&scenario_id) {
        Ok(scenario) => scenario,
        Err(err) => return engine_error_response(&err),
    };
    let result = match state
        .registry
        .project(&request.persona, &scenario_id, &request.config)
    {
        Ok(result) => result,
        Err(err) => return engine_error_response(&err),
    };

    json_response(
        StatusCode::OK,
        build_simulate_response(scenario, &request.config, &result),
    )
}

async fn compare_handler(
    State(state): State<AppState>,
    Json(payload): Json<ComparePayload>,
) -> Response {
    compare_handler_impl(&state, payload)
}

fn compare_handler_impl(state: &AppState, payload: ComparePayload) -> Response {
    let requested = payload.scenarios.unwrap_or_default();
    let request = match api_request_from_payload(payload.base) {
        Ok(request) => request,
        Err(msg) => return bad_request(&msg),
    };
    let scenario_ids = resolve_scenario_ids(&state.registry, requested);

    match state
        .registry
        .run_comparison(&request.persona, &scenario_ids, &request.config)
    {
        Ok(comparison) => json_response(
            StatusCode::OK,
            CompareResponse {
                persona: request.persona,
                summaries: comparison.summaries(),
                results: comparison.into_results(),
                flat_rate: None,
            },
        ),
        Err(err) => engine_error_response(&err),
    }
}

async fn solve_handler(
    State(state): State<AppState>,
    Json(payload): Json<SolvePayload>,
) -> Response {
    solve_handler_impl(&state, payload)
}

fn solve_handler_impl(state: &AppState, payload: SolvePayload) -> Response {
    let defaults = FlatRateSolveConfig::default();
    let solve = FlatRateSolveConfig {
        search_min: payload.search_min.map(|v| v / 100.0).unwrap_or(defaults.search_min),
        search_max: payload.search_max.map(|v| v / 100.0).unwrap_or(defaults.search_max),
        tolerance: payload.tolerance.unwrap_or(defaults.tolerance),
        max_iterations: payload.max_iterations.unwrap_or(defaults.max_iterations),
    };
    let reference_id = payload
        .base
        .scenario
        .clone()
        .unwrap_or_else(|| scenarios::STATUS_QUO_ID.to_string());
    let request = match api_request_from_payload(payload.base) {
        Ok(request) => request,
        Err(msg) => return bad_request(&msg),
    };

    let outcome = state
        .registry
        .get_scenario(&reference_id)
        .and_then(|reference| solve_flat_rate(&request.persona, reference, &request.config, solve));
    match outcome {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => engine_error_response(&err),
    }
}

fn build_simulate_response<'a>(
    scenario: &'a TaxScenario,
    config: &SimulationConfig,
    result: &'a LifeIncomeResult,
) -> SimulateResponse<'a> {
    SimulateResponse {
        scenario_id: scenario.id(),
        scenario_name: scenario.name(),
        vat_rate: scenario.vat_rate_override().unwrap_or(config.vat_rate),
        years: result.years(),
        distribution: result.tax_distribution(),
        lifetime_income: result.lifetime_income(),
        effective_rate: result.effective_tax_rate(),
        terminal_wealth: result.terminal_wealth(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn bad_request(msg: &str) -> Response {
    warn!(error = msg, "rejected request");
    error_response(StatusCode::BAD_REQUEST, msg)
}

fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UnknownScenario(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidPersona { .. } | EngineError::InvalidConfig { .. } => {
            StatusCode::BAD_REQUEST
        }
        EngineError::InvalidBrackets { .. } | EngineError::EmptyResult => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn engine_error_response(err: &EngineError) -> Response {
    let status = engine_error_status(err);
    warn!(%status, error = %err, "engine rejected request");
    error_response(status, &err.to_string())
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<SimulationRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<SimulationRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.name {
        cli.name = v;
    }
    if let Some(v) = payload.icon {
        cli.icon = v;
    }
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.initial_age {
        cli.initial_age = Some(v);
    }
    if let Some(v) = payload.current_income {
        cli.current_income = v;
    }
    if let Some(v) = payload.savings_rate {
        cli.savings_rate = v;
    }
    if let Some(v) = payload.inheritance_age {
        cli.inheritance_age = v;
    }
    if let Some(v) = payload.inheritance_amount {
        cli.inheritance_amount = v;
    }

    if let Some(v) = payload.horizon_age {
        cli.horizon_age = v;
    }
    if let Some(v) = payload.growth_rate {
        cli.growth_rate = v;
    }
    if let Some(v) = payload.income_growth_rate {
        cli.income_growth_rate = v;
    }
    if let Some(v) = payload.vat_rate {
        cli.vat_rate = v;
    }
    if let Some(v) = payload.vat_applicable_rate {
        cli.vat_applicable_rate = v;
    }
    if let Some(v) = payload.allow_negative_wealth {
        cli.allow_negative_wealth = v;
    }

    if let Some(v) = payload.tax_class {
        cli.tax_class = v.into();
    }
    if let Some(v) = payload.company_share {
        cli.company_share = v;
    }
    if let Some(v) = payload.hardship_exception {
        cli.hardship_exception = v;
    }

    build_inputs(&cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        name: "Persona".to_string(),
        icon: "person".to_string(),
        current_age: 30,
        initial_age: None,
        current_income: 50_000.0,
        savings_rate: 10.0,
        inheritance_age: 60,
        inheritance_amount: 100_000.0,
        horizon_age: 90,
        growth_rate: 5.0,
        income_growth_rate: 0.0,
        vat_rate: 19.0,
        vat_applicable_rate: 70.0,
        allow_negative_wealth: false,
        tax_class: CliTaxClass::I,
        company_share: 0.0,
        hardship_exception: false,
        scenarios: Vec::new(),
        solve_flat_rate_against: None,
        verbose: false,
    }
}
