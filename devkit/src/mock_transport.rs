/*!
Transport simulé pour tester le collecteur sans WinRM

Chaque appel est enregistré. Les réponses se scriptent par sonde (reconnue via
la ligne `# probe: <nom>` du script), globalement ou hôte par hôte, avec
latence, refus de connexion et blocage jusqu'au timeout.
*/

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use winhealth_collector::{ProbeKind, Target, Transport, TransportError, TransportOutput};

/// Réponse simulée d'un hôte à un script
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Sortie standard, code de retour 0
    Json(String),
    /// Échec du script distant
    Exit { code: i32, stderr: String },
    /// Connexion refusée immédiatement
    Refused,
    /// Ne répond jamais: le timeout de l'appel expire
    Hang,
}

impl MockReply {
    pub fn json<S: Into<String>>(stdout: S) -> Self {
        MockReply::Json(stdout.into())
    }
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub host: String,
    pub probe: Option<ProbeKind>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct HostScript {
    replies: HashMap<ProbeKind, MockReply>,
    unreachable: bool,
    refusals_left: usize,
    delay: Duration,
    probe_delays: HashMap<ProbeKind, Duration>,
}

/// Mock Transport qui remplace `CommandTransport`
#[derive(Clone, Default)]
pub struct MockTransport {
    defaults: Arc<Mutex<HashMap<ProbeKind, MockReply>>>,
    hosts: Arc<Mutex<HashMap<String, HostScript>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Réponses utilisées par tous les hôtes sans réponse spécifique
    pub fn set_defaults(&self, replies: HashMap<ProbeKind, String>) {
        let mut defaults = self.defaults.lock().unwrap();
        for (probe, stdout) in replies {
            defaults.insert(probe, MockReply::Json(stdout));
        }
    }

    pub fn set_default(&self, probe: ProbeKind, reply: MockReply) {
        self.defaults.lock().unwrap().insert(probe, reply);
    }

    pub fn set_reply(&self, host: &str, probe: ProbeKind, reply: MockReply) {
        self.with_host(host, |script| {
            script.replies.insert(probe, reply);
        });
    }

    /// Toutes les sondes de l'hôte sont refusées
    pub fn set_unreachable(&self, host: &str) {
        self.with_host(host, |script| script.unreachable = true);
    }

    /// Refuse les `count` premiers appels vers l'hôte, puis répond normalement
    pub fn refuse_first_calls(&self, host: &str, count: usize) {
        self.with_host(host, |script| script.refusals_left = count);
    }

    /// Latence appliquée à chaque appel vers l'hôte
    pub fn set_delay(&self, host: &str, delay: Duration) {
        self.with_host(host, |script| script.delay = delay);
    }

    pub fn set_probe_delay(&self, host: &str, probe: ProbeKind, delay: Duration) {
        self.with_host(host, |script| {
            script.probe_delays.insert(probe, delay);
        });
    }

    fn with_host<F: FnOnce(&mut HostScript)>(&self, host: &str, f: F) {
        let mut hosts = self.hosts.lock().unwrap();
        f(hosts.entry(host.to_string()).or_default());
    }

    /// Tous les appels reçus (pour assertions de tests)
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, host: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.host == host)
            .cloned()
            .collect()
    }

    /// Nombre maximal d'appels simultanés observé
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn plan(&self, host: &str, probe: Option<ProbeKind>) -> (MockReply, Duration) {
        let mut hosts = self.hosts.lock().unwrap();
        let script = hosts.entry(host.to_string()).or_default();

        let delay = probe
            .and_then(|p| script.probe_delays.get(&p).copied())
            .unwrap_or(script.delay);

        let reply = if script.unreachable {
            MockReply::Refused
        } else if script.refusals_left > 0 {
            script.refusals_left -= 1;
            MockReply::Refused
        } else {
            let scripted = probe.and_then(|p| script.replies.get(&p).cloned());
            scripted
                .or_else(|| probe.and_then(|p| self.defaults.lock().unwrap().get(&p).cloned()))
                .unwrap_or_else(|| MockReply::Exit {
                    code: 1,
                    stderr: format!("no scripted reply for {probe:?}"),
                })
        };

        (reply, delay)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        target: &Target,
        script: &str,
        timeout: Duration,
    ) -> Result<TransportOutput, TransportError> {
        let probe = ProbeKind::from_script(script);
        self.calls.lock().unwrap().push(MockCall {
            host: target.name.clone(),
            probe,
            at: Instant::now(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let (reply, delay) = self.plan(&target.name, probe);
        log::debug!("🧪 [MOCK] {} {:?} -> {:?} after {:?}", target.name, probe, reply, delay);

        if matches!(reply, MockReply::Hang) || delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout(timeout));
        }
        tokio::time::sleep(delay).await;

        match reply {
            MockReply::Json(stdout) => Ok(TransportOutput::success(stdout)),
            MockReply::Exit { code, stderr } => Ok(TransportOutput {
                stdout: String::new(),
                stderr,
                exit_code: code,
            }),
            MockReply::Refused => Err(TransportError::Connection(format!(
                "connection refused by {}",
                target.address
            ))),
            MockReply::Hang => Err(TransportError::Timeout(timeout)),
        }
    }
}
