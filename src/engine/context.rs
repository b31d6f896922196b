// Execution context - the mutable state of exactly one run

//! # Execution Context
//!
//! An `ExecutionContext` owns everything that changes from one run to the
//! next while the [`PetriNet`] stays fixed:
//!
//! - **Run id**: allocated by [`start_run`](ExecutionContext::start_run);
//!   a newer id supersedes every older one on the same context
//! - **Token store**: place → token, written by firing completions
//! - **Disabled set**: transitions excluded from this run
//! - **Parameters**: the view state (reference, region, pixel mapping, uid)
//!
//! ## Thread Safety
//!
//! Tokens, the disabled set and the "already claimed" set are the only state
//! touched concurrently: completion callbacks arrive on arbitrary worker
//! threads while the scheduling loop computes readiness. All three live in one
//! `RunState` behind a single mutex, so a token becoming visible and its
//! consumers being claimed happen atomically.
//!
//! Parameters are declared and set through `&mut self`. Once the context is
//! shared (`Arc<ExecutionContext>`) with a scheduler they are read-only.
//!
//! ## Rust Learning Notes:
//!
//! ### Interior Mutability
//! Most methods take `&self` even though they modify the run state. The
//! `Mutex` provides the mutation ("interior mutability"), which is what lets
//! many tasks share one context through an `Arc`.
//!
//! ### Poisoned Locks
//! A panic while holding a `std::sync::Mutex` poisons it. The run state stays
//! consistent between operations, so we simply take the guard back with
//! `PoisonError::into_inner` instead of propagating the panic.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{PetriNet, PlaceId, Token, TokenValue, TransitionId};
use crate::{PipelineError, Result};

/// Name of the run-scoped unique id parameter every context declares
pub const UID: &str = "uid";

struct Parameter {
    type_id: TypeId,
    type_name: &'static str,
    value: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
struct RunState {
    tokens: HashMap<PlaceId, Token>,
    disabled: HashSet<TransitionId>,
    /// Submitted or fired in this run
    claimed: HashSet<TransitionId>,
}

/// Per-run mutable state over a shared, immutable [`PetriNet`]
pub struct ExecutionContext {
    net: Arc<PetriNet>,
    parameters: HashMap<String, Parameter>,
    seeds: HashMap<PlaceId, TokenValue>,
    state: Mutex<RunState>,
    execution_id: AtomicU64,
    run_token: Mutex<CancellationToken>,
}

impl ExecutionContext {
    /// Create a context over `net` with a fresh [`UID`] parameter
    pub fn new(net: Arc<PetriNet>) -> Self {
        let mut context = ExecutionContext {
            net,
            parameters: HashMap::new(),
            seeds: HashMap::new(),
            state: Mutex::new(RunState::default()),
            execution_id: AtomicU64::new(0),
            run_token: Mutex::new(CancellationToken::new()),
        };
        let uid: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        context.parameters.insert(
            UID.to_string(),
            Parameter {
                type_id: TypeId::of::<String>(),
                type_name: std::any::type_name::<String>(),
                value: Some(Arc::new(uid)),
            },
        );
        context
    }

    pub fn net(&self) -> &Arc<PetriNet> {
        &self.net
    }

    /// Short unique id used to correlate log lines of one run
    pub fn uid(&self) -> &str {
        self.parameter::<String>(UID)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Declare a parameter of type `T`; re-declaring replaces the old one
    pub fn new_parameter<T: Any + Send + Sync>(&mut self, name: impl Into<String>) -> &mut Self {
        self.parameters.insert(
            name.into(),
            Parameter {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                value: None,
            },
        );
        self
    }

    /// Set a declared parameter, checking the declared type
    pub fn set_parameter<T: Any + Send + Sync>(&mut self, name: &str, value: T) -> Result<()> {
        let parameter = self
            .parameters
            .get_mut(name)
            .ok_or_else(|| PipelineError::UndeclaredParameter {
                name: name.to_string(),
            })?;
        if parameter.type_id != TypeId::of::<T>() {
            return Err(PipelineError::ParameterType {
                name: name.to_string(),
                expected: parameter.type_name,
                actual: std::any::type_name::<T>(),
            });
        }
        parameter.value = Some(Arc::new(value));
        Ok(())
    }

    /// Read a parameter; unset or undeclared parameters are errors
    pub fn parameter<T: Any + Send + Sync>(&self, name: &str) -> Result<&T> {
        let parameter = self
            .parameters
            .get(name)
            .ok_or_else(|| PipelineError::UndeclaredParameter {
                name: name.to_string(),
            })?;
        let value = parameter
            .value
            .as_ref()
            .ok_or_else(|| PipelineError::ParameterNotSet {
                name: name.to_string(),
            })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| PipelineError::ParameterType {
                name: name.to_string(),
                expected: parameter.type_name,
                actual: std::any::type_name::<T>(),
            })
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters
            .get(name)
            .map_or(false, |p| p.value.is_some())
    }

    // ------------------------------------------------------------------
    // Seeds and run lifecycle
    // ------------------------------------------------------------------

    /// Provide the token a source place receives at run start
    ///
    /// Unseeded sources receive a unit token. Seeds survive [`reset`](Self::reset).
    pub fn seed<P: Into<PlaceId>>(&mut self, place: P, value: TokenValue) -> Result<()> {
        let place = place.into();
        let source = self
            .net
            .place(&place)
            .ok_or_else(|| PipelineError::UnknownPlace {
                id: place.to_string(),
            })?
            .is_source();
        if !source {
            return Err(PipelineError::InvalidRequest(format!(
                "place {} is produced by a transition and cannot be seeded",
                place
            )));
        }
        self.seeds.insert(place, value);
        Ok(())
    }

    /// Clear tokens, disabled overrides and fired/submitted bookkeeping
    ///
    /// Must not be called while a run on this context is active.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.tokens.clear();
        state.disabled.clear();
        state.claimed.clear();
    }

    /// Allocate a new run id, superseding any run started before
    ///
    /// The previous run's cancellation token is cancelled and source places
    /// without a token receive their seed.
    pub fn start_run(&self) -> u64 {
        self.start_run_within(&CancellationToken::new())
    }

    /// Like [`start_run`](Self::start_run), with the run's cancellation token
    /// derived from `parent` so cancelling `parent` cancels the run
    pub fn start_run_within(&self, parent: &CancellationToken) -> u64 {
        self.begin_run(parent).0
    }

    /// Start a run and return its id together with its own cancellation token
    pub(crate) fn begin_run(&self, parent: &CancellationToken) -> (u64, CancellationToken) {
        let mut state = self.lock();
        let run_token = parent.child_token();
        {
            let mut token = self.run_token.lock().unwrap_or_else(PoisonError::into_inner);
            token.cancel();
            *token = run_token.clone();
        }
        let id = self.execution_id.fetch_add(1, Ordering::SeqCst) + 1;

        for place in self.net.sources() {
            if !state.tokens.contains_key(place.id()) {
                let value = self
                    .seeds
                    .get(place.id())
                    .cloned()
                    .unwrap_or_else(TokenValue::unit);
                state.tokens.insert(place.id().clone(), Token::seeded(value));
            }
        }
        (id, run_token)
    }

    /// The id most recently returned by `start_run`, 0 before the first run
    pub fn execution_id(&self) -> u64 {
        self.execution_id.load(Ordering::SeqCst)
    }

    /// True iff `execution_id` is the most recently started run
    pub fn is_current(&self, execution_id: u64) -> bool {
        self.execution_id() == execution_id
    }

    /// Cancellation token of the current run
    pub fn run_token(&self) -> CancellationToken {
        self.run_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the current run has been cancelled; long jobs should poll this
    pub fn is_cancelled(&self) -> bool {
        self.run_token().is_cancelled()
    }

    // ------------------------------------------------------------------
    // Disabling
    // ------------------------------------------------------------------

    /// Exclude a transition from this run
    pub fn disable(&self, transition: &TransitionId) -> Result<()> {
        self.check_transition(transition)?;
        self.lock().disabled.insert(transition.clone());
        Ok(())
    }

    pub fn is_disabled(&self, transition: &TransitionId) -> bool {
        self.lock().disabled.contains(transition)
    }

    pub fn disabled_transitions(&self) -> HashSet<TransitionId> {
        self.lock().disabled.clone()
    }

    /// Disable every transition flagged as disabled in the net or by its job
    ///
    /// Returns how many transitions were newly disabled.
    pub fn disable_statically_disabled(&self) -> usize {
        let mut state = self.lock();
        let mut count = 0;
        for transition in self.net.transitions() {
            if transition.is_statically_disabled() && state.disabled.insert(transition.id().clone()) {
                count += 1;
            }
        }
        count
    }

    /// Disable every transition that can never become ready
    ///
    /// The output place of a disabled transition is never marked (unless it
    /// already holds a token), so its consumers are disabled too, breadth-first
    /// along consumer edges. Returns how many transitions were newly disabled.
    pub fn disable_unreachable(&self) -> usize {
        let mut state = self.lock();
        let mut queue: VecDeque<TransitionId> = state.disabled.iter().cloned().collect();
        let mut count = 0;

        while let Some(id) = queue.pop_front() {
            let Some(transition) = self.net.transition(&id) else {
                continue;
            };
            if state.tokens.contains_key(transition.output()) {
                continue;
            }
            for consumer in self.net.consumers(transition.output()) {
                if state.disabled.insert(consumer.clone()) {
                    count += 1;
                    queue.push_back(consumer.clone());
                }
            }
        }
        count
    }

    // ------------------------------------------------------------------
    // Tokens and readiness
    // ------------------------------------------------------------------

    /// Deposit a token into `place` on behalf of run `execution_id`
    ///
    /// Fails for superseded runs, unknown places and occupied places.
    pub fn put_token(&self, execution_id: u64, place: &PlaceId, token: Token) -> Result<()> {
        let mut state = self.lock();
        self.check_current(execution_id)?;
        Self::insert_token(&self.net, &mut state, place, token)
    }

    pub fn token(&self, place: &PlaceId) -> Option<Token> {
        self.lock().tokens.get(place).cloned()
    }

    pub fn has_token(&self, place: &PlaceId) -> bool {
        self.lock().tokens.contains_key(place)
    }

    /// Snapshot of every marked place
    pub fn tokens(&self) -> HashMap<PlaceId, Token> {
        self.lock().tokens.clone()
    }

    /// Not disabled (statically or for this run), not yet submitted/fired,
    /// and every input holds a token
    pub fn is_ready(&self, transition: &TransitionId) -> bool {
        let state = self.lock();
        self.ready_in(&state, transition)
    }

    /// Whether the transition was already submitted or fired in this run
    pub fn is_claimed(&self, transition: &TransitionId) -> bool {
        self.lock().claimed.contains(transition)
    }

    /// Input tokens of `transition`, in declaration order
    pub fn inputs_for(&self, transition: &TransitionId) -> Result<Vec<TokenValue>> {
        let definition = self.check_transition(transition)?;
        let state = self.lock();
        definition
            .inputs()
            .iter()
            .map(|place| {
                state
                    .tokens
                    .get(place)
                    .map(|t| t.value.clone())
                    .ok_or_else(|| PipelineError::Internal(format!(
                        "input {} of {} holds no token",
                        place, transition
                    )))
            })
            .collect()
    }

    /// Claim the transitions that are ready at run start
    ///
    /// These are the ready consumers of the source places plus the ready
    /// transitions that have no inputs at all.
    pub(crate) fn claim_initial(&self, execution_id: u64) -> Result<Vec<TransitionId>> {
        let mut state = self.lock();
        self.check_current(execution_id)?;

        let mut candidates: Vec<&TransitionId> = self
            .net
            .sources()
            .flat_map(|p| p.consumers())
            .collect();
        candidates.extend(self.net.unconditioned().map(|t| t.id()));

        Ok(self.claim_ready(&mut state, candidates))
    }

    /// Record a firing's result and claim the consumers it made ready
    ///
    /// Token visibility and consumer claiming happen under one lock, which is
    /// what gives the "inputs before start" ordering across worker threads.
    /// A cancelled run is treated like a superseded one: nothing is deposited.
    pub(crate) fn complete_firing(
        &self,
        execution_id: u64,
        transition: &TransitionId,
        value: TokenValue,
    ) -> Result<Vec<TransitionId>> {
        let definition = self.check_transition(transition)?;
        let output = definition.output();

        let mut state = self.lock();
        self.check_current(execution_id)?;
        // Lock order matches begin_run: state, then run token
        if self.is_cancelled() {
            return Err(PipelineError::StaleRun { execution_id });
        }
        Self::insert_token(&self.net, &mut state, output, Token::produced(value, transition.clone()))?;

        let consumers: Vec<&TransitionId> = self.net.consumers(output).iter().collect();
        Ok(self.claim_ready(&mut state, consumers))
    }

    fn claim_ready<'a>(
        &self,
        state: &mut RunState,
        candidates: impl IntoIterator<Item = &'a TransitionId>,
    ) -> Vec<TransitionId> {
        let mut ready = Vec::new();
        for candidate in candidates {
            if self.ready_in(state, candidate) {
                state.claimed.insert(candidate.clone());
                ready.push(candidate.clone());
            }
        }
        ready
    }

    fn ready_in(&self, state: &RunState, transition: &TransitionId) -> bool {
        let Some(definition) = self.net.transition(transition) else {
            return false;
        };
        !definition.is_statically_disabled()
            && !state.disabled.contains(transition)
            && !state.claimed.contains(transition)
            && definition
                .inputs()
                .iter()
                .all(|place| state.tokens.contains_key(place))
    }

    fn insert_token(net: &PetriNet, state: &mut RunState, place: &PlaceId, token: Token) -> Result<()> {
        if net.place(place).is_none() {
            return Err(PipelineError::UnknownPlace {
                id: place.to_string(),
            });
        }
        if state.tokens.contains_key(place) {
            return Err(PipelineError::PlaceOccupied {
                place: place.to_string(),
            });
        }
        state.tokens.insert(place.clone(), token);
        Ok(())
    }

    fn check_current(&self, execution_id: u64) -> Result<()> {
        if self.is_current(execution_id) {
            Ok(())
        } else {
            Err(PipelineError::StaleRun { execution_id })
        }
    }

    fn check_transition(&self, transition: &TransitionId) -> Result<&crate::models::Transition> {
        self.net
            .transition(transition)
            .ok_or_else(|| PipelineError::UnknownTransition {
                id: transition.to_string(),
            })
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.parameters.keys().collect();
        names.sort();
        f.debug_struct("ExecutionContext")
            .field("uid", &self.uid())
            .field("execution_id", &self.execution_id())
            .field("parameters", &names)
            .finish()
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        write!(
            f,
            "context {} (execution {}, {} tokens, {} disabled)",
            self.uid(),
            self.execution_id(),
            state.tokens.len(),
            state.disabled.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FnJob, PetriNetBuilder};

    fn noop() -> FnJob {
        FnJob::new(|_, _| Ok(TokenValue::unit()))
    }

    /// src -> a -> pa ; src -> b -> pb ; {pa, pb} -> join -> pj ; pa -> tail -> pt
    fn fan_net() -> Arc<PetriNet> {
        Arc::new(
            PetriNetBuilder::new()
                .place("src")
                .place("pa")
                .place("pb")
                .place("pj")
                .place("pt")
                .transition("a", noop(), ["src"], "pa")
                .transition("b", noop(), ["src"], "pb")
                .transition("join", noop(), ["pa", "pb"], "pj")
                .transition("tail", noop(), ["pa"], "pt")
                .build()
                .unwrap(),
        )
    }

    fn t(name: &str) -> TransitionId {
        TransitionId::from(name)
    }

    fn p(name: &str) -> PlaceId {
        PlaceId::from(name)
    }

    #[test]
    fn test_parameters_are_typed() {
        let mut context = ExecutionContext::new(fan_net());
        context.new_parameter::<u64>("width").new_parameter::<String>("reference");

        assert!(matches!(
            context.parameter::<u64>("width"),
            Err(PipelineError::ParameterNotSet { .. })
        ));
        assert!(matches!(
            context.set_parameter("width", "wide".to_string()),
            Err(PipelineError::ParameterType { .. })
        ));
        assert!(matches!(
            context.set_parameter("height", 3u64),
            Err(PipelineError::UndeclaredParameter { .. })
        ));

        context.set_parameter("width", 1200u64).unwrap();
        context.set_parameter("reference", "chr1".to_string()).unwrap();
        assert_eq!(*context.parameter::<u64>("width").unwrap(), 1200);
        assert_eq!(context.parameter::<String>("reference").unwrap(), "chr1");
        assert!(context.has_parameter("width"));
        assert!(matches!(
            context.parameter::<i32>("width"),
            Err(PipelineError::ParameterType { .. })
        ));
    }

    #[test]
    fn test_uid_is_set_on_creation() {
        let a = ExecutionContext::new(fan_net());
        let b = ExecutionContext::new(fan_net());
        assert_eq!(a.uid().len(), 8);
        assert_ne!(a.uid(), b.uid());
        assert!(a.has_parameter(UID));
    }

    #[test]
    fn test_run_ids_supersede() {
        let context = ExecutionContext::new(fan_net());
        assert_eq!(context.execution_id(), 0);

        let first = context.start_run();
        let first_token = context.run_token();
        assert!(context.is_current(first));
        assert!(!first_token.is_cancelled());

        let second = context.start_run();
        assert!(second > first);
        assert!(!context.is_current(first));
        assert!(context.is_current(second));
        assert!(first_token.is_cancelled());
        assert!(!context.is_cancelled());

        // Stale runs may not deposit tokens
        let err = context
            .put_token(first, &p("pa"), Token::seeded(TokenValue::unit()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::StaleRun { execution_id } if execution_id == first));
    }

    #[test]
    fn test_run_token_follows_parent() {
        let context = ExecutionContext::new(fan_net());
        let parent = CancellationToken::new();
        context.start_run_within(&parent);
        assert!(!context.is_cancelled());
        parent.cancel();
        assert!(context.is_cancelled());
    }

    #[test]
    fn test_cancelled_run_rejects_completions() {
        let context = ExecutionContext::new(fan_net());
        let parent = CancellationToken::new();
        let run = context.start_run_within(&parent);
        assert_eq!(context.claim_initial(run).unwrap().len(), 2);

        // The id stays current, only the token is cancelled
        parent.cancel();
        assert!(context.is_current(run));

        let err = context
            .complete_firing(run, &t("a"), TokenValue::unit())
            .unwrap_err();
        assert!(matches!(err, PipelineError::StaleRun { execution_id } if execution_id == run));
        assert!(!context.has_token(&p("pa")));
        assert!(!context.is_claimed(&t("tail")));
    }

    #[test]
    fn test_readiness_fan_in() {
        let context = ExecutionContext::new(fan_net());
        let run = context.start_run();

        // Sources are marked at run start
        assert!(context.has_token(&p("src")));
        assert!(context.is_ready(&t("a")));
        assert!(context.is_ready(&t("b")));
        assert!(!context.is_ready(&t("join")));

        context
            .put_token(run, &p("pa"), Token::produced(TokenValue::unit(), t("a")))
            .unwrap();
        assert!(context.is_ready(&t("tail")));
        assert!(!context.is_ready(&t("join")));

        context
            .put_token(run, &p("pb"), Token::produced(TokenValue::unit(), t("b")))
            .unwrap();
        assert!(context.is_ready(&t("join")));

        context.disable(&t("join")).unwrap();
        assert!(!context.is_ready(&t("join")));
        assert!(!context.is_ready(&t("unknown")));
    }

    #[test]
    fn test_tokens_are_never_overwritten() {
        let context = ExecutionContext::new(fan_net());
        let run = context.start_run();
        context
            .put_token(run, &p("pa"), Token::seeded(TokenValue::new(1u8)))
            .unwrap();
        let err = context
            .put_token(run, &p("pa"), Token::seeded(TokenValue::new(2u8)))
            .unwrap_err();
        assert!(matches!(err, PipelineError::PlaceOccupied { .. }));
        assert_eq!(
            context.token(&p("pa")).unwrap().value.downcast_ref::<u8>(),
            Some(&1)
        );
        assert!(matches!(
            context.put_token(run, &p("nowhere"), Token::seeded(TokenValue::unit())),
            Err(PipelineError::UnknownPlace { .. })
        ));
    }

    #[test]
    fn test_claims_are_at_most_once() {
        let context = ExecutionContext::new(fan_net());
        let run = context.start_run();

        let mut initial = context.claim_initial(run).unwrap();
        initial.sort();
        assert_eq!(initial, vec![t("a"), t("b")]);
        assert!(context.is_claimed(&t("a")));
        assert!(!context.is_ready(&t("a")));
        // A second claim finds nothing new
        assert!(context.claim_initial(run).unwrap().is_empty());

        let ready = context.complete_firing(run, &t("a"), TokenValue::unit()).unwrap();
        assert_eq!(ready, vec![t("tail")]);
        let ready = context.complete_firing(run, &t("b"), TokenValue::unit()).unwrap();
        assert_eq!(ready, vec![t("join")]);

        // Firing twice would overwrite pa
        assert!(context.complete_firing(run, &t("a"), TokenValue::unit()).is_err());
    }

    #[test]
    fn test_seeds_and_reset() {
        let mut context = ExecutionContext::new(fan_net());
        context.seed("src", TokenValue::new(42u32)).unwrap();
        assert!(matches!(
            context.seed("pa", TokenValue::unit()),
            Err(PipelineError::InvalidRequest(_))
        ));
        assert!(matches!(
            context.seed("nowhere", TokenValue::unit()),
            Err(PipelineError::UnknownPlace { .. })
        ));

        let run = context.start_run();
        assert_eq!(
            context.token(&p("src")).unwrap().value.downcast_ref::<u32>(),
            Some(&42)
        );
        context.claim_initial(run).unwrap();
        context.disable(&t("tail")).unwrap();

        context.reset();
        assert!(context.tokens().is_empty());
        assert!(context.disabled_transitions().is_empty());
        assert!(!context.is_claimed(&t("a")));

        // Seeds survive the reset
        context.start_run();
        assert!(context.token(&p("src")).unwrap().is_seed());
        assert_eq!(
            context.token(&p("src")).unwrap().value.downcast_ref::<u32>(),
            Some(&42)
        );
    }

    #[test]
    fn test_disable_unreachable_follows_consumers() {
        let context = ExecutionContext::new(fan_net());
        context.disable(&t("a")).unwrap();

        assert_eq!(context.disable_unreachable(), 2);
        let disabled = context.disabled_transitions();
        assert!(disabled.contains(&t("join")));
        assert!(disabled.contains(&t("tail")));
        // b is fed by src, not through a
        assert!(!disabled.contains(&t("b")));
    }

    #[test]
    fn test_disable_unreachable_keeps_alternate_paths() {
        let context = ExecutionContext::new(fan_net());
        context.disable(&t("b")).unwrap();

        context.disable_unreachable();
        let disabled = context.disabled_transitions();
        assert!(disabled.contains(&t("join")));
        assert!(!disabled.contains(&t("a")));
        assert!(!disabled.contains(&t("tail")));
    }

    #[test]
    fn test_disable_statically_disabled() {
        let net = Arc::new(
            PetriNetBuilder::new()
                .place("src")
                .place("x")
                .place("y")
                .place("z")
                .disabled_transition("hidden", noop(), ["src"], "x")
                .transition("invisible", noop().disabled(), ["src"], "y")
                .transition("depends", noop(), ["x"], "z")
                .build()
                .unwrap(),
        );
        let context = ExecutionContext::new(net);
        assert_eq!(context.disable_statically_disabled(), 2);
        assert_eq!(context.disable_unreachable(), 1);
        assert!(context.is_disabled(&t("depends")));
        assert!(matches!(
            context.disable(&t("nope")),
            Err(PipelineError::UnknownTransition { .. })
        ));
    }

    #[test]
    fn test_inputs_follow_declaration_order() {
        let context = ExecutionContext::new(fan_net());
        let run = context.start_run();
        context
            .put_token(run, &p("pb"), Token::seeded(TokenValue::new("b")))
            .unwrap();
        context
            .put_token(run, &p("pa"), Token::seeded(TokenValue::new("a")))
            .unwrap();

        let inputs = context.inputs_for(&t("join")).unwrap();
        let names: Vec<&str> = inputs
            .iter()
            .map(|v| *v.downcast_ref::<&str>().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(context.inputs_for(&t("tail")).is_ok());
        assert!(matches!(
            context.inputs_for(&t("nope")),
            Err(PipelineError::UnknownTransition { .. })
        ));
    }
}
