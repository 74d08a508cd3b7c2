//! The orchestrator: binds the intent engine, context store, service
//! registry and tool clients into one `process_command` surface, plus the
//! background maintenance loops.
//!
//! Routing errors never escape as errors: they are converted into
//! human-readable response strings while the registry records the failure,
//! so front-ends always receive a well-formed command response.

mod tools;

pub use tools::orchestrator_tool_server;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use config::Settings;
use dashmap::DashMap;
use fabric::{factory_fn, ClientConfig, ConnectionState, ToolClient, Transport, WsTransport};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{
    ContextError, ContextStore, InterfaceKind, SessionContext, SessionUpdate,
};
use crate::nlu::{IntentEngine, IntentResult, INTENT_FOLLOW_UP};
use crate::registry::{
    HealthStatus, ServiceAnalytics, ServiceInfo, ServiceKind, ServiceRegistry,
};

/// Fixed intent → service-name map consulted by the router.
const INTENT_SERVICES: &[(&str, &str)] = &[
    ("play_music", "audio-assistant"),
    ("control_volume", "audio-assistant"),
    ("switch_audio", "audio-assistant"),
    ("system_control", "platform-core"),
    ("file_operation", "file-fetch"),
    ("hardware_control", "hardware-bridge"),
    ("smart_home", "home-automation"),
    ("communication", "messaging"),
    ("navigation", "navigation"),
];

/// One inbound command from a front-end.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommandRequest {
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub interface_type: Option<InterfaceKind>,
    /// Free-form context (e.g. `location`) merged into session variables.
    #[serde(default)]
    pub context: Option<BTreeMap<String, String>>,
}

/// The envelope returned for every command, errors included.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response: String,
    pub intent: String,
    pub confidence: f64,
    pub context_used: bool,
    pub alternatives: Vec<(String, f64)>,
    pub session_id: String,
}

/// Where routing landed: the response text plus the intent/parameters that
/// were actually used (after follow-up reconstitution).
struct Routed {
    response: String,
    intent: String,
    parameters: BTreeMap<String, String>,
    /// True when a follow-up was resolved against the previous turn.
    context_used: bool,
}

/// Central host of the service mesh.
pub struct Orchestrator {
    engine: IntentEngine,
    context: ContextStore,
    registry: ServiceRegistry,
    clients: DashMap<String, Arc<ToolClient>>,
    http: reqwest::Client,
    settings: Settings,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Fails when the persistence directory cannot be created — a fatal
    /// startup condition for the binary.
    pub fn new(settings: Settings) -> Result<Arc<Self>, ContextError> {
        let context = ContextStore::open(
            settings.data_dir.clone(),
            settings.session_ttl_minutes,
            settings.history_cap,
        )?;
        let http = reqwest::Client::new();
        Ok(Arc::new(Self {
            engine: IntentEngine::new(),
            context,
            registry: ServiceRegistry::new(),
            clients: DashMap::new(),
            http,
            settings,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Declares a service. Message-oriented services get a tool client with
    /// a websocket transport factory dialing the declared endpoint; HTTP
    /// services are called one-shot per dispatch.
    pub async fn register_service(self: &Arc<Self>, mut info: ServiceInfo) {
        let name = info.name.clone();
        info!(service = %name, kind = ?info.kind, host = %info.host, port = info.port, "registering service");

        match info.kind {
            ServiceKind::Rpc => {
                let url = format!("ws://{}:{}", info.host, info.port);
                let client = Arc::new(ToolClient::new(
                    factory_fn(move || {
                        let url = url.clone();
                        async move {
                            let transport = WsTransport::connect(&url).await?;
                            Ok(Arc::new(transport) as Arc<dyn Transport>)
                        }
                    }),
                    ClientConfig {
                        client_name: format!("switchboard:{}", name),
                        request_timeout: self.settings.call_timeout(),
                        heartbeat_interval: self.settings.heartbeat_interval(),
                        heartbeat_wait: self.settings.heartbeat_wait(),
                        reconnect_delay: self.settings.reconnect_delay(),
                        max_reconnect_attempts: self.settings.max_reconnect_attempts,
                        ..ClientConfig::default()
                    },
                ));
                self.clients.insert(name.clone(), client.clone());
                info.health = HealthStatus::Connecting;
                self.registry.register(info);

                let orchestrator = self.clone();
                tokio::spawn(async move {
                    match client.connect().await {
                        Ok(()) => orchestrator.registry.set_health(&name, HealthStatus::Healthy),
                        Err(e) => {
                            warn!(service = %name, error = %e, "initial connect failed");
                            orchestrator
                                .registry
                                .set_health(&name, HealthStatus::Disconnected);
                        }
                    }
                });
            }
            ServiceKind::Http => self.registry.register(info),
        }
    }

    /// Classification only: intent, confidence, parameters, alternatives.
    pub fn analyze(&self, text: &str, session_id: Option<&str>) -> IntentResult {
        let session = session_id.and_then(|id| self.context.get_session(id));
        self.engine.parse(text, session.as_ref())
    }

    /// Mints a session for a user/interface pair.
    pub fn create_session(&self, user_id: &str, interface_type: InterfaceKind) -> String {
        self.context.create_session(user_id, interface_type)
    }

    pub fn analytics(&self, service: Option<&str>) -> BTreeMap<String, ServiceAnalytics> {
        self.registry.analytics(service)
    }

    pub fn services(&self) -> Vec<ServiceInfo> {
        self.registry.snapshot()
    }

    /// Per-service health map, optionally narrowed to one service.
    pub fn health(&self, service: Option<&str>) -> BTreeMap<String, HealthStatus> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|s| service.map_or(true, |n| s.name == n))
            .map(|s| (s.name, s.health))
            .collect()
    }

    /// The full pipeline for one command: session load/create → classify →
    /// route → record history and last-turn fields.
    pub async fn process_command(&self, request: CommandRequest) -> CommandResponse {
        let user_id = request.user_id.as_deref().unwrap_or("anonymous");
        let interface = request.interface_type.unwrap_or_default();
        self.context.touch_user(user_id);

        let session_id = match request.session_id {
            Some(id) => id,
            None => self.context.create_session(user_id, interface),
        };

        // Supplied front-end context (e.g. location) flows into session
        // variables before classification so boosts can see it.
        if let Some(vars) = request.context.clone() {
            self.context.update_session(
                &session_id,
                SessionUpdate {
                    variables: Some(vars),
                    ..SessionUpdate::default()
                },
            );
        }

        let session = self.context.get_session(&session_id);
        let intent_result = self.engine.parse(&request.text, session.as_ref());
        info!(
            intent = %intent_result.intent,
            confidence = intent_result.confidence,
            "classified command"
        );

        let routed = self.route(&intent_result, session.as_ref()).await;

        if session.is_some() {
            self.context.update_session(
                &session_id,
                SessionUpdate {
                    last_intent: Some(routed.intent.clone()),
                    last_parameters: Some(routed.parameters.clone()),
                    ..SessionUpdate::default()
                },
            );
            self.context
                .add_to_history(&session_id, &request.text, &routed.response);
        }

        CommandResponse {
            response: routed.response,
            intent: intent_result.intent,
            confidence: intent_result.confidence,
            context_used: intent_result.context_used || routed.context_used,
            alternatives: intent_result.alternatives,
            session_id,
        }
    }

    /// Follow-up reconstitution, low-confidence clarification, intent →
    /// service mapping and dispatch.
    async fn route(&self, result: &IntentResult, session: Option<&SessionContext>) -> Routed {
        let mut resolved = result.clone();

        if resolved.intent == INTENT_FOLLOW_UP {
            match session {
                Some(s) if !s.last_intent.is_empty() && s.last_intent != INTENT_FOLLOW_UP => {
                    // Session parameters overridden by any newly extracted ones.
                    let mut merged = s.last_parameters.clone();
                    merged.extend(resolved.parameters);
                    resolved = IntentResult {
                        intent: s.last_intent.clone(),
                        confidence: 0.8,
                        parameters: merged,
                        original_text: resolved.original_text,
                        context_used: true,
                        alternatives: Vec::new(),
                    };
                }
                _ => {
                    return Routed {
                        response: "I don't have context for a follow-up. Please be more specific."
                            .into(),
                        intent: result.intent.clone(),
                        parameters: result.parameters.clone(),
                        context_used: false,
                    };
                }
            }
        }

        if resolved.confidence < 0.3 {
            return Routed {
                response: clarification(&resolved),
                intent: resolved.intent,
                parameters: resolved.parameters,
                context_used: resolved.context_used,
            };
        }

        let Some(service_name) = INTENT_SERVICES
            .iter()
            .find(|(intent, _)| *intent == resolved.intent)
            .map(|(_, service)| *service)
        else {
            return Routed {
                response: format!("No service available for intent: {}", resolved.intent),
                intent: resolved.intent,
                parameters: resolved.parameters,
                context_used: resolved.context_used,
            };
        };

        let response = self
            .call_service(service_name, &resolved.intent, &resolved.parameters, session)
            .await;
        Routed {
            response,
            intent: resolved.intent,
            parameters: resolved.parameters,
            context_used: resolved.context_used,
        }
    }

    /// Dispatches one tool call and records the outcome in the registry and
    /// session. Failures come back as response strings, never as errors.
    async fn call_service(
        &self,
        service_name: &str,
        tool_name: &str,
        parameters: &BTreeMap<String, String>,
        session: Option<&SessionContext>,
    ) -> String {
        let Some(service) = self.registry.get(service_name) else {
            return format!("Service {} is not available", service_name);
        };

        let mut arguments = serde_json::Map::new();
        for (k, v) in parameters {
            arguments.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        if let Some(s) = session {
            arguments.insert("session_id".into(), s.session_id.clone().into());
            arguments.insert("user_id".into(), s.user_id.clone().into());
        }

        let started = Instant::now();
        let outcome = match service.kind {
            ServiceKind::Rpc => {
                self.call_rpc_service(service_name, tool_name, arguments.into())
                    .await
            }
            ServiceKind::Http => {
                self.call_http_service(&service, tool_name, arguments.into())
                    .await
            }
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(response) => {
                self.registry.record_success(service_name, elapsed);
                if let Some(s) = session {
                    self.context.update_session(
                        &s.session_id,
                        SessionUpdate {
                            last_used_service: Some(service_name.to_string()),
                            ..SessionUpdate::default()
                        },
                    );
                }
                response
            }
            Err(reason) => {
                warn!(service = %service_name, %reason, "service call failed");
                self.registry.record_failure(service_name, Some(elapsed));
                reason
            }
        }
    }

    async fn call_rpc_service(
        &self,
        service_name: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, String> {
        let Some(client) = self
            .clients
            .get(service_name)
            .map(|c| Arc::clone(c.value()))
        else {
            return Err(format!("Service {} is not connected", service_name));
        };
        if client.state() != ConnectionState::Connected {
            return Err(format!("Service {} is not connected", service_name));
        }
        match client.call_tool(tool_name, arguments).await {
            Ok(result) => {
                let text = fabric::first_text(&result)
                    .map(str::to_string)
                    .unwrap_or_else(|| result.to_string());
                Ok(format!("Service {} responded: {}", service_name, text))
            }
            Err(e) => Err(format!("Error calling service {}: {}", service_name, e)),
        }
    }

    async fn call_http_service(
        &self,
        service: &ServiceInfo,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, String> {
        let url = format!("http://{}:{}/api/{}", service.host, service.port, tool_name);
        let response = self
            .http
            .post(&url)
            .timeout(self.settings.call_timeout())
            .json(&arguments)
            .send()
            .await
            .map_err(|e| format!("Error calling service {}: {}", service.name, e))?;

        if !response.status().is_success() {
            return Err(format!(
                "Error calling service {}: http {}",
                service.name,
                response.status()
            ));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("Error calling service {}: {}", service.name, e))?;
        Ok(body
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()))
    }

    /// Starts the session-cleanup and health-check loops.
    pub fn start_maintenance(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());

        let orchestrator = self.clone();
        tasks.push(tokio::spawn(async move {
            let interval = orchestrator.settings.cleanup_interval();
            loop {
                tokio::select! {
                    _ = orchestrator.cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                orchestrator.context.cleanup_expired_sessions();
            }
        }));

        let orchestrator = self.clone();
        tasks.push(tokio::spawn(async move {
            let interval = orchestrator.settings.health_interval();
            loop {
                tokio::select! {
                    _ = orchestrator.cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                orchestrator.check_all_services().await;
            }
        }));
        info!("background maintenance started");
    }

    /// One health-check sweep over the registry.
    pub async fn check_all_services(&self) {
        for service in self.registry.snapshot() {
            match service.kind {
                ServiceKind::Http => {
                    let url = format!("http://{}:{}/health", service.host, service.port);
                    let started = Instant::now();
                    let health = match self
                        .http
                        .get(&url)
                        .timeout(Duration::from_secs(5))
                        .send()
                        .await
                    {
                        Ok(r) if r.status().is_success() => HealthStatus::Healthy,
                        Ok(_) => HealthStatus::Unhealthy,
                        Err(e) => {
                            debug!(service = %service.name, error = %e, "health probe failed");
                            HealthStatus::Error
                        }
                    };
                    self.registry
                        .record_probe(&service.name, health, started.elapsed());
                }
                ServiceKind::Rpc => {
                    // Message-oriented services are watched by their
                    // client's heartbeat; just mirror the connection state.
                    if let Some(client) = self.clients.get(&service.name) {
                        let health = match client.state() {
                            ConnectionState::Connected => HealthStatus::Healthy,
                            ConnectionState::Connecting => HealthStatus::Connecting,
                            ConnectionState::Disconnected => HealthStatus::Disconnected,
                        };
                        self.registry.set_health(&service.name, health);
                    }
                }
            }
        }
    }

    /// Cancels background loops (bounded join) and closes every client.
    pub async fn shutdown(&self) {
        info!("shutting down orchestrator");
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for mut handle in handles {
            if tokio::time::timeout(Duration::from_secs(5), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
        let clients: Vec<Arc<ToolClient>> =
            self.clients.iter().map(|e| e.value().clone()).collect();
        for client in clients {
            client.close().await;
        }
    }
}

/// Low-confidence reply listing up to two alternatives.
fn clarification(result: &IntentResult) -> String {
    let alternatives: Vec<&str> = result
        .alternatives
        .iter()
        .take(2)
        .map(|(intent, _)| intent.as_str())
        .collect();
    if alternatives.is_empty() {
        "I'm not sure what you meant. Please rephrase.".to_string()
    } else {
        format!(
            "I'm not sure what you meant. Did you mean: {}? (confidence: {:.2})",
            alternatives.join(", "),
            result.confidence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarification_lists_at_most_two_alternatives() {
        let mut result = IntentResult::unknown("mumble");
        result.alternatives = vec![
            ("play_music".into(), 0.2),
            ("smart_home".into(), 0.1),
            ("navigation".into(), 0.05),
        ];
        let text = clarification(&result);
        assert!(text.contains("play_music, smart_home"));
        assert!(!text.contains("navigation"));
    }

    #[test]
    fn every_mapped_intent_is_in_the_catalog() {
        for (intent, _) in INTENT_SERVICES {
            assert!(
                crate::nlu::CATALOG.iter().any(|def| def.name == *intent),
                "intent {} has a service mapping but no catalog entry",
                intent
            );
        }
    }

    #[tokio::test]
    async fn follow_up_merges_with_new_parameters_winning() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let orchestrator = Orchestrator::new(settings).unwrap();

        let session_id = orchestrator.create_session("u1", InterfaceKind::Text);
        orchestrator.context.update_session(
            &session_id,
            SessionUpdate {
                last_intent: Some("play_music".into()),
                last_parameters: Some(BTreeMap::from([
                    ("genre".into(), "jazz".into()),
                    ("mood".into(), "sad".into()),
                ])),
                ..SessionUpdate::default()
            },
        );
        let session = orchestrator.context.get_session(&session_id).unwrap();

        let follow_up = IntentResult {
            intent: INTENT_FOLLOW_UP.into(),
            confidence: 0.75,
            parameters: BTreeMap::from([("mood".into(), "happy".into())]),
            original_text: "yes".into(),
            context_used: false,
            alternatives: Vec::new(),
        };
        let routed = orchestrator.route(&follow_up, Some(&session)).await;

        // P from the session, Q from the new turn, Q wins on conflicts.
        assert_eq!(routed.intent, "play_music");
        assert_eq!(routed.parameters.get("genre").map(String::as_str), Some("jazz"));
        assert_eq!(routed.parameters.get("mood").map(String::as_str), Some("happy"));
        assert!(routed.context_used);
        // No audio service registered in this test.
        assert!(routed.response.contains("not available"));
    }

    #[tokio::test]
    async fn follow_up_without_context_asks_for_specifics() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let orchestrator = Orchestrator::new(settings).unwrap();

        let response = orchestrator
            .process_command(CommandRequest {
                text: "yes".into(),
                user_id: Some("u1".into()),
                interface_type: Some(InterfaceKind::Text),
                ..CommandRequest::default()
            })
            .await;
        assert_eq!(response.intent, INTENT_FOLLOW_UP);
        assert_eq!(
            response.response,
            "I don't have context for a follow-up. Please be more specific."
        );
    }
}
