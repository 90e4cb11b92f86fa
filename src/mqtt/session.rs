use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rumqttc::{
    AsyncClient, ConnAck, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, Publish,
    QoS, SubAck, SubscribeReasonCode,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::topic::{matching_filter, prefixed_filter, topic_matches};
use super::tracker::AckTracker;
use crate::bridge::MessagePublisher;
use crate::utils::config::ServerSettings;

pub const WILL_TOPIC: &str = "homeautomation/will";
pub const WILL_PAYLOAD: &str = "homeautomation lost connection";

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_FLUSH_ATTEMPTS: usize = 5;
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("not connected, dropping message for topic '{topic}'")]
    NotConnected { topic: String },
    #[error("failed to publish message to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },
    #[error("failed to subscribe to topic '{filter}': {reason}")]
    Subscribe { filter: String, reason: String },
}

/// Error returned by a subscription callback.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Arc<dyn Fn(&str, Option<&[u8]>) -> Result<(), HandlerError> + Send + Sync>;

/// Receives a notification every time the session (re)connects to the broker.
pub trait ConnectionListener: Send + Sync {
    fn on_connected(&self, client_id: &str);
}

struct Subscription {
    filter: String,
    callback: Callback,
}

struct Connection {
    client: AsyncClient,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Inner {
    settings: ServerSettings,
    client_id: String,
    listener: Arc<dyn ConnectionListener>,
    state: watch::Sender<SessionState>,
    connection: Mutex<Option<Connection>>,
    closing: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    publishes: Mutex<AckTracker>,
    subscribes: Mutex<AckTracker>,
}

/// A session with one MQTT broker.
///
/// The handle is cheap to clone and every operation can be called from any
/// thread. Network I/O happens on a background task started by [`connect`];
/// none of the operations wait for the broker.
///
/// [`connect`]: MqttSession::connect
#[derive(Clone)]
pub struct MqttSession {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MqttSession {
    pub fn new(settings: ServerSettings, listener: Arc<dyn ConnectionListener>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                settings,
                client_id: Uuid::new_v4().to_string(),
                listener,
                state,
                connection: Mutex::new(None),
                closing: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
                publishes: Mutex::new(AckTracker::new()),
                subscribes: Mutex::new(AckTracker::new()),
            }),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Registered subscription filters, including the configured prefix.
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.inner.subscriptions)
            .iter()
            .map(|subscription| subscription.filter.clone())
            .collect()
    }

    /// Starts connecting in the background. Failures are logged and retried with
    /// exponential backoff until [`disconnect`](MqttSession::disconnect) is called.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut connection = lock(&self.inner.connection);
        if connection.is_some() {
            warn!("MQTT session {} is already started", self.inner.client_id);
            return;
        }

        let settings = &self.inner.settings;
        let (client, eventloop) = AsyncClient::new(self.inner.mqtt_options(), settings.request_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(
            "Connecting to MQTT broker {}:{} as {}",
            settings.host, settings.port, self.inner.client_id
        );
        self.inner.state.send_replace(SessionState::Connecting);

        // Packet ids restart with the new client
        for topic in lock(&self.inner.publishes).reset() {
            error!("failed to publish message to topic: {} (connection closed)", topic);
        }
        lock(&self.inner.subscribes).reset();

        let task = tokio::spawn(run_event_loop(
            self.inner.clone(),
            client.clone(),
            eventloop,
            shutdown_rx,
        ));
        *connection = Some(Connection {
            client,
            shutdown,
            task,
        });
    }

    /// Sends `payload` to `topic` with exactly-once delivery.
    ///
    /// Fails immediately with [`SessionError::NotConnected`] unless the session is
    /// connected. Once queued, a message the broker does not complete in time is
    /// logged and dropped.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        let client = self
            .inner
            .connected_client()
            .ok_or_else(|| SessionError::NotConnected {
                topic: topic.to_string(),
            })?;

        // Hold the tracker while queueing so packet ids are attributed in request order
        let mut publishes = lock(&self.inner.publishes);
        client
            .try_publish(topic, QoS::ExactlyOnce, false, payload)
            .map_err(|e| SessionError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        publishes.enqueue(topic);

        trace!("Queued message for topic '{}'", topic);
        Ok(())
    }

    /// Registers `callback` for messages matching `filter`.
    ///
    /// The configured subscription prefix is prepended to the filter. The
    /// subscription is sent right away when connected and re-sent after every
    /// reconnect. Errors and panics raised by the callback are logged.
    pub fn subscribe<F>(&self, filter: &str, callback: F)
    where
        F: Fn(&str, Option<&[u8]>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let filter = prefixed_filter(&self.inner.settings.subscription_topic_prefix, filter);
        lock(&self.inner.subscriptions).push(Subscription {
            filter: filter.clone(),
            callback: Arc::new(callback),
        });

        match self.inner.connected_client() {
            Some(client) => self.inner.request_subscribe(&client, &filter),
            None => debug!(
                "Not connected yet, subscription to '{}' is sent once connected",
                filter
            ),
        }
    }

    /// Closes the connection and stops reconnecting. In-flight publishes are not
    /// awaited.
    pub fn disconnect(&self) {
        let connection = lock(&self.inner.connection).take();
        let Some(connection) = connection else {
            debug!("MQTT session {} is not started", self.inner.client_id);
            return;
        };

        connection.shutdown.send_replace(true);
        self.inner.state.send_replace(SessionState::Disconnected);

        info!("Disconnecting from MQTT broker...");
        if let Err(e) = connection.client.try_disconnect() {
            debug!("Could not queue disconnect request: {}", e);
        }
        let mut closing = lock(&self.inner.closing);
        closing.retain(|task| !task.is_finished());
        closing.push(connection.task);
    }

    /// Disconnects and waits (bounded) for the background task to flush the
    /// disconnect to the broker.
    pub async fn shutdown(&self) {
        self.disconnect();

        let tasks: Vec<JoinHandle<()>> = lock(&self.inner.closing).drain(..).collect();
        for task in tasks {
            match time::timeout(SHUTDOWN_JOIN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("MQTT event loop task failed: {}", e),
                Err(_) => warn!("Timed out waiting for the MQTT event loop to stop"),
            }
        }
        debug!("MQTT session {} shut down", self.inner.client_id);
    }
}

impl MessagePublisher for MqttSession {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError> {
        MqttSession::publish(self, topic, payload)
    }
}

impl Inner {
    fn mqtt_options(&self) -> MqttOptions {
        let settings = &self.settings;
        let mut options = MqttOptions::new(&self.client_id, &settings.host, settings.port);
        options
            .set_keep_alive(settings.keep_alive())
            .set_clean_session(true)
            .set_last_will(LastWill::new(
                WILL_TOPIC,
                WILL_PAYLOAD,
                QoS::AtLeastOnce,
                false,
            ));

        if let Some((username, password)) = settings.credentials() {
            options.set_credentials(username, password);
        }

        options
    }

    fn connected_client(&self) -> Option<AsyncClient> {
        if *self.state.borrow() != SessionState::Connected {
            return None;
        }
        lock(&self.connection)
            .as_ref()
            .map(|connection| connection.client.clone())
    }

    /// Moves to `state` unless the session was asked to shut down.
    fn transition(&self, stop: &watch::Receiver<bool>, state: SessionState) {
        self.state.send_if_modified(|current| {
            if *stop.borrow() || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn request_subscribe(&self, client: &AsyncClient, filter: &str) {
        let mut subscribes = lock(&self.subscribes);
        match client.try_subscribe(filter, QoS::ExactlyOnce) {
            Ok(()) => {
                subscribes.enqueue(filter);
                debug!("Subscribing to topic: {}", filter);
            }
            Err(e) => error!("failed to subscribe to topic: {}: {}", filter, e),
        }
    }

    /// Returns true when the broker acknowledged the connection.
    fn handle_event(&self, client: &AsyncClient, stop: &watch::Receiver<bool>, event: Event) -> bool {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                self.on_connected(client, stop, &ack);
                return true;
            }
            Event::Incoming(Packet::Publish(publish)) => self.dispatch(publish),
            Event::Incoming(Packet::SubAck(ack)) => self.on_suback(&ack),
            Event::Incoming(Packet::PubComp(comp)) => {
                if let Some(topic) = lock(&self.publishes).acknowledge(comp.pkid) {
                    debug!("Delivered message to topic '{}'", topic);
                }
            }
            Event::Incoming(Packet::Disconnect) => warn!("Broker closed the session"),
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                lock(&self.publishes).sent(pkid, Instant::now());
            }
            Event::Outgoing(Outgoing::Subscribe(pkid)) => {
                lock(&self.subscribes).sent(pkid, Instant::now());
            }
            other => trace!("MQTT event: {:?}", other),
        }
        false
    }

    fn on_connected(&self, client: &AsyncClient, stop: &watch::Receiver<bool>, ack: &ConnAck) {
        // Unacknowledged publishes are sent again under their packet ids,
        // pending subscriptions are not and get re-issued below
        let resent = lock(&self.publishes).inflight_len();
        if resent > 0 {
            debug!("Resending {} unacknowledged message(s)", resent);
        }
        let dropped = lock(&self.subscribes).drain_inflight();
        if !dropped.is_empty() {
            debug!("Re-issuing {} unacknowledged subscription(s)", dropped.len());
        }
        trace!("Session present: {}", ack.session_present);

        self.transition(stop, SessionState::Connected);
        info!(
            "Connected to MQTT broker {}:{}",
            self.settings.host, self.settings.port
        );

        let mut filters: Vec<String> = lock(&self.subscriptions)
            .iter()
            .map(|subscription| subscription.filter.clone())
            .collect();
        filters.sort();
        filters.dedup();
        for filter in &filters {
            self.request_subscribe(client, filter);
        }

        self.listener.on_connected(&self.client_id);
    }

    fn on_suback(&self, ack: &SubAck) {
        let Some(filter) = lock(&self.subscribes).acknowledge(ack.pkid) else {
            debug!("Received SubAck for unknown packet id {}", ack.pkid);
            return;
        };

        if ack
            .return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            error!("failed to subscribe to topic: {}", filter);
        } else {
            info!("successfully subscribed to topic: {}", filter);
        }
    }

    /// Runs every matching callback on its own task.
    fn dispatch(&self, publish: Publish) {
        let handlers: Vec<Callback> = lock(&self.subscriptions)
            .iter()
            .filter(|subscription| {
                topic_matches(matching_filter(&subscription.filter), &publish.topic)
            })
            .map(|subscription| subscription.callback.clone())
            .collect();

        if handlers.is_empty() {
            debug!("No handler for message on topic '{}'", publish.topic);
            return;
        }

        let topic: Arc<str> = Arc::from(publish.topic);
        for callback in handlers {
            let topic = topic.clone();
            let payload = publish.payload.clone();
            tokio::spawn(async move { consume(&callback, &topic, &payload) });
        }
    }

    fn expire_stale_requests(&self, now: Instant) {
        let timeout = self.settings.publish_timeout();

        let topics = lock(&self.publishes).expire(now, timeout);
        for topic in topics {
            error!(
                "failed to publish message to topic: {} (not completed within {:?})",
                topic, timeout
            );
        }
        let filters = lock(&self.subscribes).expire(now, timeout);
        for filter in filters {
            error!(
                "failed to subscribe to topic: {} (not acknowledged within {:?})",
                filter, timeout
            );
        }
    }
}

fn consume(callback: &Callback, topic: &str, payload: &[u8]) {
    let payload = (!payload.is_empty()).then_some(payload);
    match panic::catch_unwind(AssertUnwindSafe(|| callback(topic, payload))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("error to consume message of topic: {}: {}", topic, e),
        Err(cause) => error!(
            "handler for topic {} panicked: {}",
            topic,
            panic_message(cause.as_ref())
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Exponential reconnect delay, doubled after every failure up to `max`.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.checked_mul(2).unwrap_or(self.max).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

async fn run_event_loop(
    inner: Arc<Inner>,
    client: AsyncClient,
    mut eventloop: EventLoop,
    mut shutdown: watch::Receiver<bool>,
) {
    let stop = shutdown.clone();
    let mut backoff = Backoff::new(
        inner.settings.reconnect_initial_delay(),
        inner.settings.reconnect_max_delay(),
    );
    let mut sweep = time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut connected = false;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = sweep.tick() => inner.expire_stale_requests(Instant::now()),
            event = eventloop.poll() => match event {
                Ok(event) => {
                    if inner.handle_event(&client, &stop, event) {
                        connected = true;
                        backoff.reset();
                    }
                }
                Err(e) => {
                    if connected {
                        warn!("Lost connection to MQTT broker: {}", e);
                    }
                    connected = false;
                    inner.transition(&stop, SessionState::Connecting);

                    let delay = backoff.next_delay();
                    error!(
                        host = %inner.settings.host,
                        port = inner.settings.port,
                        retry_in_ms = delay.as_millis() as u64,
                        "failed to connect to server: {}",
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    if connected {
        flush_disconnect(&mut eventloop).await;
    }
    debug!("MQTT event loop for {} stopped", inner.client_id);
}

/// Polls the event loop a few more times so the queued disconnect reaches the broker.
async fn flush_disconnect(eventloop: &mut EventLoop) {
    for attempt in 1..=SHUTDOWN_FLUSH_ATTEMPTS {
        debug!(
            "Processing shutdown events (attempt {}/{})",
            attempt, SHUTDOWN_FLUSH_ATTEMPTS
        );
        match time::timeout(SHUTDOWN_FLUSH_TIMEOUT, eventloop.poll()).await {
            Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) => {
                debug!("Successfully disconnected from MQTT broker");
                break;
            }
            Ok(Ok(event)) => debug!("Processing shutdown event: {:?}", event),
            Ok(Err(e)) => {
                debug!("Event processing error during shutdown: {}", e);
                break;
            }
            Err(_) => {
                debug!("Timed out flushing MQTT events");
                break;
            }
        }
    }
}
