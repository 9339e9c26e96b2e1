//! Integration tests for the driver against a scripted in-process engine.
//!
//! The fake engine plugs in through the transport factory seam and
//! speaks the real JSON protocol, so every test exercises the full
//! dispatch pipeline: normalization, admission, the worker-pool cycle,
//! and the result futures. Response gating makes concurrency scenarios
//! deterministic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use grapnel_driver::proto::{
    ops, processors, RequestEnvelope, RequestFrame, ResponseFrame, Value, TRAVERSAL_SOURCE_ALIAS,
};
use grapnel_driver::{Client, ClientConfig, Error, Remote, Transport};

/// One in-process engine shared by every connection of a client.
struct FakeEngine {
    /// Values every bytecode operation answers with.
    traversal_values: Vec<Value>,
    /// When present, each response frame costs one permit.
    gate: Option<Semaphore>,
    /// Fail every send with a transport error.
    fail_sends: bool,
    /// Answer every request with a terminal server error.
    fail_requests: bool,
    /// Demand one authentication round per connection.
    require_auth: bool,
    /// Every request frame seen, in arrival order.
    requests: Mutex<Vec<RequestFrame>>,
    connected: AtomicUsize,
    closed: AtomicUsize,
}

impl FakeEngine {
    fn new(values: Vec<Value>) -> Arc<Self> {
        Arc::new(Self::base(values))
    }

    /// Engine that withholds responses until released.
    fn gated(values: Vec<Value>) -> Arc<Self> {
        let mut engine = Self::base(values);
        engine.gate = Some(Semaphore::new(0));
        Arc::new(engine)
    }

    /// Engine whose transports refuse every write.
    fn failing_sends() -> Arc<Self> {
        let mut engine = Self::base(Vec::new());
        engine.fail_sends = true;
        Arc::new(engine)
    }

    /// Engine that answers everything with a server error.
    fn erroring() -> Arc<Self> {
        let mut engine = Self::base(Vec::new());
        engine.fail_requests = true;
        Arc::new(engine)
    }

    /// Engine that challenges each connection for credentials once.
    fn with_auth(values: Vec<Value>) -> Arc<Self> {
        let mut engine = Self::base(values);
        engine.require_auth = true;
        Arc::new(engine)
    }

    fn base(values: Vec<Value>) -> Self {
        Self {
            traversal_values: values,
            gate: None,
            fail_sends: false,
            fail_requests: false,
            require_auth: false,
            requests: Mutex::new(Vec::new()),
            connected: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// Allow one gated response through.
    fn release_one(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    fn respond_to(&self, frame: &RequestFrame) -> ResponseFrame {
        if self.fail_requests {
            return ResponseFrame::error(frame.id, 500, "engine failure");
        }
        match frame.envelope.op.as_str() {
            ops::SIDE_EFFECT_KEYS => ResponseFrame::ok(
                frame.id,
                vec![Value::from("counts"), Value::from("errors")],
            ),
            ops::SIDE_EFFECT_GATHER => ResponseFrame::ok(frame.id, vec![Value::Int64(42)]),
            _ => ResponseFrame::ok(frame.id, self.traversal_values.clone()),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn requests(&self) -> Vec<RequestFrame> {
        self.requests.lock().clone()
    }

    fn connected_transports(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    fn closed_transports(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// One connection's view of the engine.
struct FakeTransport {
    engine: Arc<FakeEngine>,
    pending: VecDeque<Vec<u8>>,
    authed: bool,
    pending_challenge: Option<RequestFrame>,
}

impl FakeTransport {
    fn new(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine,
            pending: VecDeque::new(),
            authed: false,
            pending_challenge: None,
        }
    }

    fn queue(&mut self, frame: ResponseFrame) {
        self.pending.push_back(serde_json::to_vec(&frame).unwrap());
    }
}

impl Transport for FakeTransport {
    fn connect<'a>(&'a mut self, _url: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.engine.connected.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if self.engine.fail_sends {
                return Err(Error::Transport("injected write failure".to_string()));
            }

            let frame: RequestFrame =
                serde_json::from_slice(payload).expect("client sent invalid JSON");
            self.engine.requests.lock().push(frame.clone());

            if frame.envelope.op == ops::AUTHENTICATION {
                let original = self
                    .pending_challenge
                    .take()
                    .expect("authentication reply without a challenge");
                self.authed = true;
                let response = self.engine.respond_to(&original);
                self.queue(response);
            } else if self.engine.require_auth && !self.authed {
                self.queue(ResponseFrame::authenticate(frame.id));
                self.pending_challenge = Some(frame);
            } else {
                let response = self.engine.respond_to(&frame);
                self.queue(response);
            }
            Ok(())
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Result<Vec<u8>, Error>> {
        Box::pin(async move {
            if let Some(gate) = &self.engine.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|_| Error::Transport("gate closed".to_string()))?;
                permit.forget();
            }
            self.pending
                .pop_front()
                .ok_or_else(|| Error::Transport("engine had no scripted response".to_string()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.engine.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn engine_config(engine: &Arc<FakeEngine>) -> ClientConfig {
    let engine = Arc::clone(engine);
    ClientConfig::new("fake://engine")
        .with_worker_count(4)
        .with_transport_factory(move || Box::new(FakeTransport::new(engine.clone())))
}

/// Poll until the engine has seen `count` requests.
async fn wait_for_requests(engine: &Arc<FakeEngine>, count: usize) {
    for _ in 0..200 {
        if engine.request_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "engine never saw {} requests (saw {})",
        count,
        engine.request_count()
    );
}

fn int_values(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::Int64(*v)).collect()
}

// ===================== Submission round trips =====================

#[tokio::test]
async fn test_connect_dials_every_connection_eagerly() {
    let engine = FakeEngine::new(Vec::new());
    let client = Client::connect(engine_config(&engine).with_pool_size(3))
        .await
        .unwrap();

    // All three links exist before anything is submitted.
    assert_eq!(engine.connected_transports(), 3);
    assert_eq!(client.idle_connections(), 3);

    client.close().await;
}

#[tokio::test]
async fn test_traversal_round_trip_yields_each_value_once() {
    let engine = FakeEngine::new(int_values(&[1, 2, 3]));
    let remote = Remote::connect(engine_config(&engine).with_pool_size(2))
        .await
        .unwrap();

    let mut result = remote.submit("g.V().values('age')").await.unwrap();
    assert_eq!(result.remaining(), 3);
    assert_eq!(result.next(), Some(Value::Int64(1)));
    assert_eq!(result.next(), Some(Value::Int64(2)));
    assert_eq!(result.next(), Some(Value::Int64(3)));

    // Single pass: the iterator is finished for good.
    assert_eq!(result.next(), None);
    assert_eq!(result.remaining(), 0);

    remote.close().await;
}

#[tokio::test]
async fn test_client_submit_envelope_passes_through() {
    let engine = FakeEngine::new(Vec::new());
    let client = Client::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    client
        .submit(RequestEnvelope::side_effect_keys(99))
        .await
        .unwrap();

    let seen = engine.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].envelope.op, ops::SIDE_EFFECT_KEYS);
    assert_eq!(
        seen[0].envelope.arg("sideEffect"),
        Some(&Value::Int64(99))
    );

    client.close().await;
}

#[tokio::test]
async fn test_alias_binding_uses_configured_source() {
    let engine = FakeEngine::new(Vec::new());
    let client = Client::connect(
        engine_config(&engine)
            .with_pool_size(1)
            .with_traversal_source("g1"),
    )
    .await
    .unwrap();

    client.submit("g1.V()").await.unwrap();

    let seen = engine.requests();
    assert_eq!(seen[0].envelope.processor, processors::TRAVERSAL);
    assert_eq!(seen[0].envelope.op, ops::BYTECODE);

    let aliases = seen[0]
        .envelope
        .arg("aliases")
        .and_then(Value::as_map)
        .unwrap();
    assert_eq!(aliases.len(), 1);
    assert_eq!(
        aliases.get(TRAVERSAL_SOURCE_ALIAS),
        Some(&Value::String("g1".into()))
    );

    client.close().await;
}

#[tokio::test]
async fn test_request_ids_are_distinct_and_echoed() {
    let engine = FakeEngine::new(Vec::new());
    let client = Client::connect(engine_config(&engine).with_pool_size(2))
        .await
        .unwrap();

    let first = client.submit("g.V()").await.unwrap();
    let second = client.submit("g.E()").await.unwrap();
    assert_ne!(first.request_id(), second.request_id());

    let seen = engine.requests();
    assert_eq!(seen[0].id, first.request_id());
    assert_eq!(seen[1].id, second.request_id());

    client.close().await;
}

// ===================== Admission control =====================

#[tokio::test]
async fn test_pool_admits_at_most_capacity() {
    let engine = FakeEngine::gated(int_values(&[7]));
    let client = Client::connect(engine_config(&engine).with_pool_size(2))
        .await
        .unwrap();
    assert_eq!(client.pool_capacity(), 2);

    let first = client.submit_async("g.V()").await.unwrap();
    let second = client.submit_async("g.V()").await.unwrap();
    wait_for_requests(&engine, 2).await;

    // Both connections are borrowed; a third submission must wait at
    // admission, before anything reaches the engine.
    let third = client.submit_async("g.V()");
    tokio::pin!(third);
    assert!(timeout(Duration::from_millis(100), &mut third).await.is_err());
    assert_eq!(engine.request_count(), 2);

    // Finishing one cycle frees its connection and admits the waiter.
    engine.release_one();
    let third = timeout(Duration::from_secs(1), &mut third)
        .await
        .expect("third submission admitted after a release")
        .unwrap();
    wait_for_requests(&engine, 3).await;

    engine.release_one();
    engine.release_one();
    first.await.unwrap();
    second.await.unwrap();
    third.await.unwrap();

    client.close().await;
}

#[tokio::test]
async fn test_single_connection_serializes_callers() {
    let engine = FakeEngine::gated(int_values(&[1]));
    let client = Client::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    let first = client.submit_async("g.V()").await.unwrap();
    wait_for_requests(&engine, 1).await;

    let second = client.submit_async("g.V()");
    tokio::pin!(second);
    assert!(timeout(Duration::from_millis(100), &mut second)
        .await
        .is_err());
    // The second caller has not even been written yet.
    assert_eq!(engine.request_count(), 1);

    engine.release_one();
    first.await.unwrap();

    let second = timeout(Duration::from_secs(1), &mut second)
        .await
        .expect("second caller admitted after the first full cycle")
        .unwrap();
    wait_for_requests(&engine, 2).await;

    engine.release_one();
    second.await.unwrap();

    client.close().await;
}

#[tokio::test]
async fn test_submit_async_returns_before_response() {
    let engine = FakeEngine::gated(int_values(&[5]));
    let client = Client::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    // The future comes back while the engine is still withholding the
    // response.
    let pending = client.submit_async("g.V()").await.unwrap();
    tokio::pin!(pending);
    assert!(timeout(Duration::from_millis(100), &mut pending)
        .await
        .is_err());

    engine.release_one();
    let result_set = timeout(Duration::from_secs(1), &mut pending)
        .await
        .expect("response released")
        .unwrap();
    assert_eq!(result_set.all().await.unwrap(), int_values(&[5]));

    client.close().await;
}

// ===================== Failure propagation =====================

#[tokio::test]
async fn test_write_failure_surfaces_from_submit() {
    let engine = FakeEngine::failing_sends();
    let client = Client::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    let err = client.submit("g.V()").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    // The connection returned to circulation despite the failure.
    assert_eq!(client.idle_connections(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_write_failure_surfaces_from_traversal_future() {
    let engine = FakeEngine::failing_sends();
    let remote = Remote::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    // The same error kind arrives through the composed future.
    let future = remote.submit_async("g.V()").await.unwrap();
    assert!(matches!(future.await, Err(Error::Transport(_))));

    remote.close().await;
}

#[tokio::test]
async fn test_server_error_keeps_code_and_message() {
    let engine = FakeEngine::erroring();
    let client = Client::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    match client.submit("g.V()").await.unwrap_err() {
        Error::Server { code, message } => {
            assert_eq!(code, 500);
            assert_eq!(message, "engine failure");
        }
        other => panic!("expected server error, got {:?}", other),
    }

    client.close().await;
}

// ===================== Lifecycle =====================

#[tokio::test]
async fn test_close_empties_pool_and_closes_connections() {
    let engine = FakeEngine::new(Vec::new());
    let client = Client::connect(engine_config(&engine).with_pool_size(3))
        .await
        .unwrap();

    client.submit("g.V()").await.unwrap();
    assert_eq!(client.idle_connections(), 3);

    client.close().await;
    assert_eq!(client.idle_connections(), 0);
    assert_eq!(engine.closed_transports(), 3);

    // With no timeout configured, a post-close submission waits forever
    // on the empty pool.
    let late = {
        let client = client.clone();
        tokio::spawn(async move { client.submit("g.V()").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!late.is_finished());
    late.abort();
}

#[tokio::test]
async fn test_acquire_timeout_bounds_post_close_submission() {
    let engine = FakeEngine::new(Vec::new());
    let client = Client::connect(
        engine_config(&engine)
            .with_pool_size(1)
            .with_acquire_timeout(Duration::from_millis(50)),
    )
    .await
    .unwrap();

    client.close().await;

    let err = client.submit("g.V()").await.unwrap_err();
    assert!(matches!(err, Error::AcquireTimeout(_)));
}

#[tokio::test]
async fn test_close_does_not_reach_borrowed_connections() {
    let engine = FakeEngine::gated(int_values(&[9]));
    let client = Client::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    let in_flight = client.submit_async("g.V()").await.unwrap();
    wait_for_requests(&engine, 1).await;

    // Close drains an empty pool immediately, then waits on the worker
    // still driving the borrowed connection.
    let closing = {
        let client = client.clone();
        tokio::spawn(async move { client.close().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!closing.is_finished());
    assert_eq!(engine.closed_transports(), 0);

    engine.release_one();
    let result_set = in_flight.await.unwrap();
    assert_eq!(result_set.all().await.unwrap(), int_values(&[9]));
    closing.await.unwrap();

    // The borrowed connection re-entered circulation unclosed.
    assert_eq!(engine.closed_transports(), 0);
    assert_eq!(client.idle_connections(), 1);
}

#[tokio::test]
async fn test_clones_share_pool_and_id_sequence() {
    let engine = FakeEngine::new(Vec::new());
    let client = Client::connect(engine_config(&engine).with_pool_size(2))
        .await
        .unwrap();
    let clone = client.clone();

    let first = client.submit("g.V()").await.unwrap();
    let second = clone.submit("g.V()").await.unwrap();

    assert_ne!(first.request_id(), second.request_id());
    assert_eq!(client.idle_connections(), 2);

    client.close().await;
    assert_eq!(clone.idle_connections(), 0);
}

// ===================== Remote adapter =====================

#[tokio::test]
async fn test_remote_submit_async_two_stage_composition() {
    let engine = FakeEngine::gated(int_values(&[1, 2, 3]));
    let remote = Remote::connect(engine_config(&engine).with_pool_size(1))
        .await
        .unwrap();

    let future = remote.submit_async("g.V()").await.unwrap();
    tokio::pin!(future);
    assert!(timeout(Duration::from_millis(100), &mut future)
        .await
        .is_err());

    engine.release_one();
    let result = timeout(Duration::from_secs(1), &mut future)
        .await
        .expect("materialized after release")
        .unwrap();

    assert_eq!(result.collect::<Vec<_>>(), int_values(&[1, 2, 3]));

    remote.close().await;
}

#[tokio::test]
async fn test_single_worker_serializes_cycles_and_continuations() {
    let engine = FakeEngine::gated(int_values(&[8]));
    let remote = Remote::connect(
        engine_config(&engine)
            .with_pool_size(2)
            .with_worker_count(1),
    )
    .await
    .unwrap();

    // Two connections, one worker: both cycles and both materialization
    // continuations run on the same worker, in submission order.
    let first = remote.submit_async("g.V()").await.unwrap();
    let second = remote.submit_async("g.E()").await.unwrap();
    tokio::pin!(first);
    tokio::pin!(second);

    wait_for_requests(&engine, 1).await;
    assert!(timeout(Duration::from_millis(100), &mut first).await.is_err());

    // The lone worker is parked inside the first cycle, so the second
    // request has not reached the engine despite holding a connection.
    assert_eq!(engine.request_count(), 1);

    engine.release_one();
    let result = timeout(Duration::from_secs(1), &mut first)
        .await
        .expect("first traversal materialized after release")
        .unwrap();
    assert_eq!(result.collect::<Vec<_>>(), int_values(&[8]));

    // With the worker free again, the second cycle gets its turn.
    wait_for_requests(&engine, 2).await;
    assert!(timeout(Duration::from_millis(100), &mut second)
        .await
        .is_err());

    engine.release_one();
    let result = timeout(Duration::from_secs(1), &mut second)
        .await
        .expect("second traversal materialized after release")
        .unwrap();
    assert_eq!(result.collect::<Vec<_>>(), int_values(&[8]));

    remote.close().await;
}

#[tokio::test]
async fn test_side_effect_retrieval() {
    let engine = FakeEngine::new(int_values(&[1]));
    let remote = Remote::connect(engine_config(&engine).with_pool_size(2))
        .await
        .unwrap();

    let result = remote.submit("g.V()").await.unwrap();
    let side_effects = result.side_effects().clone();
    let traversal_id = side_effects.request_id();

    assert_eq!(side_effects.keys().await.unwrap(), vec!["counts", "errors"]);
    assert_eq!(
        side_effects.get("counts").await.unwrap(),
        vec![Value::Int64(42)]
    );

    let seen = engine.requests();
    assert_eq!(seen.len(), 3);

    let keys_frame = &seen[1];
    assert_eq!(keys_frame.envelope.op, ops::SIDE_EFFECT_KEYS);
    assert_eq!(
        keys_frame.envelope.arg("sideEffect"),
        Some(&Value::Int64(traversal_id as i64))
    );

    let gather_frame = &seen[2];
    assert_eq!(gather_frame.envelope.op, ops::SIDE_EFFECT_GATHER);
    assert_eq!(
        gather_frame.envelope.arg("sideEffectKey"),
        Some(&Value::String("counts".into()))
    );
    let aliases = gather_frame
        .envelope
        .arg("aliases")
        .and_then(Value::as_map)
        .unwrap();
    assert_eq!(
        aliases.get(TRAVERSAL_SOURCE_ALIAS),
        Some(&Value::String("g".into()))
    );

    remote.close().await;
}

// ===================== Authentication =====================

#[tokio::test]
async fn test_authentication_challenge_round() {
    let engine = FakeEngine::with_auth(int_values(&[11]));
    let client = Client::connect(
        engine_config(&engine)
            .with_pool_size(1)
            .with_credentials("marko", "rainbow"),
    )
    .await
    .unwrap();

    let values = client.submit("g.V()").await.unwrap().all().await.unwrap();
    assert_eq!(values, int_values(&[11]));

    let seen = engine.requests();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].envelope.op, ops::BYTECODE);

    // The reply reuses the challenged request's identifier.
    assert_eq!(seen[1].envelope.op, ops::AUTHENTICATION);
    assert_eq!(seen[1].id, seen[0].id);
    assert_eq!(
        seen[1].envelope.arg("username"),
        Some(&Value::String("marko".into()))
    );
    assert_eq!(
        seen[1].envelope.arg("password"),
        Some(&Value::String("rainbow".into()))
    );

    client.close().await;
}
