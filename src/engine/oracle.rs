use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::anyhow;
use serde::Serialize;

use crate::engine::rng::GameRng;
use crate::engine::timers::Millis;

/// One question for the external decision service.
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,

    /// The closed answer set for decisions; empty for free text.
    pub answers: Vec<String>,

    /// Filled in by the oracle when the request is submitted.
    pub timeout: Millis,
}

/// Anything that can turn a request into raw text. Blocking is fine; the
/// threaded backend keeps it off the game loop.
pub trait DecisionService: Send + Sync + 'static {
    fn complete(&self, request: &OracleRequest) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OracleTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A matched allowed answer, or the trimmed free text.
    Answer(String),
    /// The service replied but nothing allowed appeared in the reply.
    Unmatched(String),
    TimedOut,
    Failed(String),
}

impl Verdict {
    pub fn answer(&self) -> Option<&str> {
        match self {
            Verdict::Answer(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn into_answer(self) -> Option<String> {
        match self {
            Verdict::Answer(answer) => Some(answer),
            _ => None,
        }
    }
}

/// Transport underneath the oracle. Replies are collected by polling so the
/// game loop never blocks.
pub trait OracleBackend: Send {
    fn submit(&mut self, now: Millis, ticket: OracleTicket, request: OracleRequest);
    fn poll(&mut self, now: Millis) -> Vec<(OracleTicket, anyhow::Result<String>)>;
    fn cancel(&mut self, _ticket: OracleTicket) {}
}

/* =========================
   Threaded backend
   ========================= */

type Reply = (OracleTicket, anyhow::Result<String>);

/// Runs each request on its own worker thread and hands results back over
/// a channel.
pub struct ThreadedBackend {
    service: Arc<dyn DecisionService>,
    tx: Sender<Reply>,
    rx: Receiver<Reply>,
}

impl ThreadedBackend {
    pub fn new(service: impl DecisionService) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            service: Arc::new(service),
            tx,
            rx,
        }
    }
}

impl OracleBackend for ThreadedBackend {
    fn submit(&mut self, _now: Millis, ticket: OracleTicket, request: OracleRequest) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();

        thread::spawn(move || {
            let result = service.complete(&request);
            // The receiver is gone once the game shuts down.
            let _ = tx.send((ticket, result));
        });
    }

    fn poll(&mut self, _now: Millis) -> Vec<Reply> {
        self.rx.try_iter().collect()
    }
}

/// Runs the service on the calling thread. Replies show up on the next poll,
/// which keeps offline matches reproducible for a given seed.
pub struct InlineBackend {
    service: Box<dyn DecisionService>,
    ready: Vec<Reply>,
}

impl InlineBackend {
    pub fn new(service: impl DecisionService) -> Self {
        Self {
            service: Box::new(service),
            ready: Vec::new(),
        }
    }
}

impl OracleBackend for InlineBackend {
    fn submit(&mut self, _now: Millis, ticket: OracleTicket, request: OracleRequest) {
        let result = self.service.complete(&request);
        self.ready.push((ticket, result));
    }

    fn poll(&mut self, _now: Millis) -> Vec<Reply> {
        std::mem::take(&mut self.ready)
    }

    fn cancel(&mut self, ticket: OracleTicket) {
        self.ready.retain(|(t, _)| *t != ticket);
    }
}

/* =========================
   Scripted backend
   ========================= */

/// How a scripted service answers one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Reply(String),
    Fail(String),
    /// Never answers.
    Silent,
    /// Answers after the given delay.
    After(Millis, String),
}

/// Shared view of every request a scripted backend has seen.
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<OracleRequest>>>);

impl RequestLog {
    fn push(&self, request: OracleRequest) {
        let mut log = self.0.lock().unwrap_or_else(|e| e.into_inner());
        log.push(request);
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Script = Box<dyn FnMut(&OracleRequest) -> Scripted + Send>;

/// Deterministic in-process backend driven by the virtual clock.
pub struct ScriptedBackend {
    script: Script,
    scheduled: Vec<(Millis, OracleTicket, anyhow::Result<String>)>,
    log: RequestLog,
}

impl ScriptedBackend {
    pub fn new(script: impl FnMut(&OracleRequest) -> Scripted + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            scheduled: Vec::new(),
            log: RequestLog::default(),
        }
    }

    /// A backend that answers nothing, for purely local play.
    pub fn silent() -> Self {
        Self::new(|_| Scripted::Silent)
    }

    pub fn request_log(&self) -> RequestLog {
        self.log.clone()
    }
}

impl OracleBackend for ScriptedBackend {
    fn submit(&mut self, now: Millis, ticket: OracleTicket, request: OracleRequest) {
        let scripted = (self.script)(&request);
        self.log.push(request);

        let entry = match scripted {
            Scripted::Reply(text) => (now, ticket, Ok(text)),
            Scripted::Fail(reason) => (now, ticket, Err(anyhow!(reason))),
            Scripted::After(delay, text) => (now + delay, ticket, Ok(text)),
            Scripted::Silent => return,
        };
        self.scheduled.push(entry);
    }

    fn poll(&mut self, now: Millis) -> Vec<Reply> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.scheduled.len() {
            if self.scheduled[i].0 <= now {
                let (_, ticket, result) = self.scheduled.remove(i);
                due.push((ticket, result));
            } else {
                i += 1;
            }
        }
        due
    }

    fn cancel(&mut self, ticket: OracleTicket) {
        self.scheduled.retain(|(_, t, _)| *t != ticket);
    }
}

/* =========================
   Offline service
   ========================= */

const IDLE_LINES: &[&str] = &[
    "We hold together. That is what matters now.",
    "Stay close. The Keep has more teeth than it shows.",
    "I hear you. Let us not waste the quiet.",
    "Whatever waits inside, we face it as one.",
];

/// Offline stand-in for the LLM: picks a random allowed answer, or a canned
/// line for free text.
pub struct DiceService {
    rng: Mutex<GameRng>,
}

impl DiceService {
    pub fn new(rng: GameRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl DecisionService for DiceService {
    fn complete(&self, request: &OracleRequest) -> anyhow::Result<String> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        if request.answers.is_empty() {
            let line = rng.pick(IDLE_LINES).copied().unwrap_or_default();
            return Ok(line.to_string());
        }

        rng.pick(&request.answers)
            .cloned()
            .ok_or_else(|| anyhow!("no answers to pick from"))
    }
}

/* =========================
   Oracle
   ========================= */

#[derive(Debug)]
struct Pending {
    allowed: Option<Vec<String>>,
    deadline: Millis,
}

/// Ticket-based front end over a backend: each question has a deadline,
/// and a reply is turned into a [`Verdict`] exactly once.
///
/// Replies for tickets that already timed out or were cancelled are
/// dropped.
pub struct DecisionOracle {
    backend: Box<dyn OracleBackend>,
    pending: HashMap<OracleTicket, Pending>,
    ready: HashMap<OracleTicket, Verdict>,
    next_ticket: u64,
}

impl DecisionOracle {
    pub fn new(backend: Box<dyn OracleBackend>) -> Self {
        Self {
            backend,
            pending: HashMap::new(),
            ready: HashMap::new(),
            next_ticket: 1,
        }
    }

    pub fn threaded(service: impl DecisionService) -> Self {
        Self::new(Box::new(ThreadedBackend::new(service)))
    }

    pub fn inline(service: impl DecisionService) -> Self {
        Self::new(Box::new(InlineBackend::new(service)))
    }

    pub fn scripted(backend: ScriptedBackend) -> Self {
        Self::new(Box::new(backend))
    }

    /// Asks for one of `allowed`. The verdict is `Answer` only for a member
    /// of the set.
    pub fn decide(
        &mut self,
        now: Millis,
        mut request: OracleRequest,
        allowed: &[String],
        timeout: Millis,
    ) -> OracleTicket {
        request.answers = allowed.to_vec();
        self.submit(now, request, Some(allowed.to_vec()), timeout)
    }

    /// Asks for free text.
    pub fn ask(&mut self, now: Millis, mut request: OracleRequest, timeout: Millis) -> OracleTicket {
        request.answers.clear();
        self.submit(now, request, None, timeout)
    }

    fn submit(
        &mut self,
        now: Millis,
        mut request: OracleRequest,
        allowed: Option<Vec<String>>,
        timeout: Millis,
    ) -> OracleTicket {
        let ticket = OracleTicket(self.next_ticket);
        self.next_ticket += 1;

        request.timeout = timeout;
        tracing::debug!(ticket = ticket.0, model = %request.model, timeout, "oracle request");

        self.pending.insert(
            ticket,
            Pending {
                allowed,
                deadline: now + timeout,
            },
        );
        self.backend.submit(now, ticket, request);
        ticket
    }

    /// Collects replies and expires overdue tickets.
    pub fn pump(&mut self, now: Millis) {
        for (ticket, result) in self.backend.poll(now) {
            let Some(pending) = self.pending.remove(&ticket) else {
                tracing::debug!(ticket = ticket.0, "discarding late oracle reply");
                continue;
            };

            let verdict = match result {
                Ok(raw) => interpret(&raw, pending.allowed.as_deref()),
                Err(err) => {
                    tracing::warn!(ticket = ticket.0, error = %err, "oracle request failed");
                    Verdict::Failed(err.to_string())
                }
            };
            self.ready.insert(ticket, verdict);
        }

        let expired: Vec<OracleTicket> = self
            .pending
            .iter()
            .filter(|(_, p)| now >= p.deadline)
            .map(|(t, _)| *t)
            .collect();

        for ticket in expired {
            self.pending.remove(&ticket);
            self.backend.cancel(ticket);
            tracing::info!(ticket = ticket.0, "oracle request timed out");
            self.ready.insert(ticket, Verdict::TimedOut);
        }
    }

    /// Removes and returns the verdict once it is available.
    pub fn take(&mut self, ticket: OracleTicket) -> Option<Verdict> {
        self.ready.remove(&ticket)
    }

    pub fn is_pending(&self, ticket: OracleTicket) -> bool {
        self.pending.contains_key(&ticket)
    }

    pub fn cancel(&mut self, ticket: OracleTicket) {
        if self.pending.remove(&ticket).is_some() {
            self.backend.cancel(ticket);
        }
        self.ready.remove(&ticket);
    }

    pub fn cancel_all(&mut self) {
        let tickets: Vec<OracleTicket> = self.pending.keys().copied().collect();
        for ticket in tickets {
            self.cancel(ticket);
        }
        self.ready.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

fn interpret(raw: &str, allowed: Option<&[String]>) -> Verdict {
    match allowed {
        None => {
            let text = raw.trim();
            if text.is_empty() {
                Verdict::Failed("empty reply".into())
            } else {
                Verdict::Answer(text.to_string())
            }
        }
        Some(allowed) => match match_answer(raw, allowed) {
            Some(answer) => Verdict::Answer(answer),
            None => {
                tracing::debug!(reply = raw, "reply matched no allowed answer");
                Verdict::Unmatched(raw.to_string())
            }
        },
    }
}

/// Finds the allowed answer contained in `raw`, ignoring case.
///
/// Whole-word hits beat bare substring hits. Within either pass, an entry
/// loses to a longer matching entry that contains it ("heavyslash" wins over
/// "slash"); otherwise the earliest entry in `allowed` wins.
pub fn match_answer(raw: &str, allowed: &[String]) -> Option<String> {
    let reply = raw.to_lowercase();
    let lowered: Vec<String> = allowed.iter().map(|a| a.to_lowercase()).collect();

    let word_hits: Vec<usize> = (0..allowed.len())
        .filter(|&i| !lowered[i].is_empty() && contains_word(&reply, &lowered[i]))
        .collect();
    if let Some(i) = pick_most_specific(&word_hits, &lowered) {
        return Some(allowed[i].clone());
    }

    let substring_hits: Vec<usize> = (0..allowed.len())
        .filter(|&i| !lowered[i].is_empty() && reply.contains(&lowered[i]))
        .collect();
    pick_most_specific(&substring_hits, &lowered).map(|i| allowed[i].clone())
}

fn pick_most_specific(hits: &[usize], lowered: &[String]) -> Option<usize> {
    hits.iter().copied().find(|&i| {
        !hits
            .iter()
            .any(|&j| j != i && lowered[j].len() > lowered[i].len() && lowered[j].contains(&lowered[i]))
    })
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::BossAttack;

    fn answers(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn request() -> OracleRequest {
        OracleRequest {
            model: "test".into(),
            system: None,
            prompt: "pick".into(),
            temperature: 0.0,
            answers: Vec::new(),
            timeout: 0,
        }
    }

    #[test]
    fn matching_ignores_case_and_surrounding_text() {
        let allowed = BossAttack::names();
        assert_eq!(
            match_answer("I shall use BREATHFIREHIGH!", &allowed).as_deref(),
            Some("BreathFireHigh")
        );
        assert_eq!(match_answer("hmm, nothing", &allowed), None);
    }

    #[test]
    fn longer_overlapping_answer_wins() {
        let allowed = answers(&["slash", "heavyslash"]);
        assert_eq!(match_answer("heavyslash", &allowed).as_deref(), Some("heavyslash"));
        assert_eq!(match_answer("Slash it!", &allowed).as_deref(), Some("slash"));
    }

    #[test]
    fn whole_words_beat_fragments() {
        let allowed = answers(&["yes", "no"]);
        assert_eq!(match_answer("No. I am not ready.", &allowed).as_deref(), Some("no"));
        assert_eq!(match_answer("Yes, it is not far.", &allowed).as_deref(), Some("yes"));
    }

    #[test]
    fn first_listed_wins_between_unrelated_answers() {
        let allowed = answers(&["both", "Elric", "Seraphine", "neither"]);
        assert_eq!(
            match_answer("Seraphine, then Elric", &allowed).as_deref(),
            Some("Elric")
        );
    }

    #[test]
    fn decide_resolves_to_an_allowed_answer() {
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| {
            Scripted::Reply("  Roar  ".into())
        }));
        let ticket = oracle.decide(0, request(), &BossAttack::names(), 1_000);

        assert_eq!(oracle.take(ticket), None, "nothing before the pump");
        oracle.pump(0);
        assert_eq!(oracle.take(ticket), Some(Verdict::Answer("Roar".into())));
        assert_eq!(oracle.take(ticket), None, "verdicts are delivered once");
    }

    #[test]
    fn off_list_reply_is_unmatched() {
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| {
            Scripted::Reply("TailWhip".into())
        }));
        let ticket = oracle.decide(0, request(), &BossAttack::names(), 1_000);
        oracle.pump(0);
        assert_eq!(oracle.take(ticket), Some(Verdict::Unmatched("TailWhip".into())));
    }

    #[test]
    fn silent_service_times_out_and_late_replies_are_dropped() {
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| {
            Scripted::After(5_000, "Roar".into())
        }));
        let ticket = oracle.decide(0, request(), &BossAttack::names(), 1_000);

        oracle.pump(999);
        assert_eq!(oracle.take(ticket), None);
        assert!(oracle.is_pending(ticket));

        oracle.pump(1_000);
        assert_eq!(oracle.take(ticket), Some(Verdict::TimedOut));

        oracle.pump(6_000);
        assert_eq!(oracle.take(ticket), None, "late reply is discarded");
    }

    #[test]
    fn failures_are_reported_separately() {
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| {
            Scripted::Fail("connection refused".into())
        }));
        let ticket = oracle.ask(0, request(), 1_000);
        oracle.pump(0);
        assert!(matches!(oracle.take(ticket), Some(Verdict::Failed(_))));
    }

    #[test]
    fn cancelled_tickets_never_resolve() {
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| {
            Scripted::After(100, "yes".into())
        }));
        let ticket = oracle.ask(0, request(), 1_000);
        oracle.cancel(ticket);

        oracle.pump(2_000);
        assert_eq!(oracle.take(ticket), None);
        assert_eq!(oracle.in_flight(), 0);
    }

    #[test]
    fn request_log_records_answers_and_timeout() {
        let backend = ScriptedBackend::new(|_| Scripted::Silent);
        let log = backend.request_log();
        let mut oracle = DecisionOracle::scripted(backend);

        oracle.decide(0, request(), &answers(&["yes", "no"]), 750);

        let seen = log.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].answers, answers(&["yes", "no"]));
        assert_eq!(seen[0].timeout, 750);
    }

    #[test]
    fn dice_service_stays_inside_the_answer_set() {
        let dice = DiceService::new(GameRng::from_seed(3));
        let mut req = request();
        req.answers = answers(&["slash", "heavyslash"]);
        for _ in 0..20 {
            let answer = dice.complete(&req).unwrap();
            assert!(req.answers.contains(&answer));
        }

        req.answers.clear();
        assert!(!dice.complete(&req).unwrap().is_empty());
    }
}
