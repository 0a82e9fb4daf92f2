//! The event loop: drains port events and the shared UDP socket into the
//! agent, applies pending configuration at tick boundaries and drives
//! transaction expiry.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

use crate::core::agent::{Action, Agent, Emission, PortContext};
use crate::core::config::{ConfigSnapshot, InterfaceConfig, Mode};
use crate::netio::frame::{DHCP_SERVER_PORT, MAX_PACKET};
use crate::netio::port::{PacketPort, PortAdapters, PortEvent};

const EVENT_QUEUE: usize = 256;

enum Step {
    Port(Option<PortEvent>),
    Udp(io::Result<usize>),
    Tick,
    Quit,
}

pub struct Dispatcher {
    agent: Agent,
    ports: HashMap<String, PacketPort>,
    udp: UdpSocket,
    events_tx: mpsc::Sender<PortEvent>,
    events: mpsc::Receiver<PortEvent>,
    config: watch::Receiver<ConfigSnapshot>,
    adapters: Box<dyn PortAdapters>,
}

impl Dispatcher {
    /// Bind the shared UDP socket and set up the event fan-in. Ports are
    /// opened when the first configuration is observed.
    pub async fn new(
        config: watch::Receiver<ConfigSnapshot>,
        adapters: Box<dyn PortAdapters>,
    ) -> io::Result<Self> {
        let udp = UdpSocket::bind(("0.0.0.0", DHCP_SERVER_PORT)).await?;
        let (events_tx, events) = mpsc::channel(EVENT_QUEUE);
        Ok(Dispatcher {
            agent: Agent::new(),
            ports: HashMap::new(),
            udp,
            events_tx,
            events,
            config,
            adapters,
        })
    }

    /// Run until interrupted.
    pub async fn run(mut self) -> io::Result<()> {
        let initial = self.config.borrow_and_update().clone();
        self.reconcile(&initial);

        let mut tick = time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = [0u8; MAX_PACKET];

        loop {
            let step = tokio::select! {
                event = self.events.recv() => Step::Port(event),
                result = self.udp.recv_from(&mut buf) => Step::Udp(result.map(|(len, _src)| len)),
                _ = tick.tick() => Step::Tick,
                _ = signal::ctrl_c() => Step::Quit,
            };
            match step {
                Step::Port(Some(event)) => self.on_port_event(event),
                Step::Port(None) => {}
                Step::Udp(Ok(len)) => {
                    let payload = buf[..len].to_vec();
                    self.on_udp(&payload);
                }
                Step::Udp(Err(err)) => log::error!("udp receive failed: {}", err),
                Step::Tick => {
                    self.maybe_reconfigure();
                    self.agent.run_expiry();
                }
                Step::Quit => {
                    log::info!("terminating on interrupt");
                    return Ok(());
                }
            }
        }
    }

    fn on_port_event(&mut self, event: PortEvent) {
        let Some(port) = self.ports.get(&event.port) else {
            log::debug!("event from departed port {}", event.port);
            return;
        };
        let emission = self.agent.process(
            &event.payload,
            Some(port),
            Some(event.src_ip),
            Some(event.src_mac),
        );
        if let Some(emission) = emission {
            self.emit(emission);
        }
    }

    fn on_udp(&mut self, payload: &[u8]) {
        if let Some(emission) = self.agent.process(payload, None, None, None) {
            self.emit(emission);
        }
    }

    /// Hand a processed packet to its send path. Failures drop the frame
    /// and never tear the port down.
    fn emit(&self, emission: Emission) {
        match emission.action {
            Action::Client => match self.ports.get(&emission.port) {
                Some(port) => {
                    if let Err(err) =
                        port.send_client(&emission.payload, emission.src_ip, emission.src_mac)
                    {
                        log::error!("send to client on {} failed: {}", emission.port, err);
                    }
                }
                None => log::debug!("origin port {} is gone, dropping reply", emission.port),
            },
            Action::UdpRelay { dst } => {
                let target = SocketAddr::from((dst, DHCP_SERVER_PORT));
                if let Err(err) = self.udp.try_send_to(&emission.payload, target) {
                    log::error!("udp relay to {} failed: {}", target, err);
                }
            }
            Action::Mitm => match self.ports.get(&emission.port) {
                Some(port) => {
                    if let Err(err) =
                        port.send_upstream(&emission.payload, emission.src_ip, emission.src_mac)
                    {
                        log::error!("send upstream on {} failed: {}", emission.port, err);
                    }
                }
                None => log::debug!("origin port {} is gone, dropping request", emission.port),
            },
        }
    }

    fn maybe_reconfigure(&mut self) {
        if self.config.has_changed().unwrap_or(false) {
            let snapshot = self.config.borrow_and_update().clone();
            self.reconcile(&snapshot);
        }
    }

    /// Swap in a configuration: close what disappeared or changed mode,
    /// open what is new, leave the rest untouched.
    fn reconcile(&mut self, snapshot: &ConfigSnapshot) {
        let active: HashMap<String, Mode> = self
            .ports
            .iter()
            .map(|(name, port)| (name.clone(), port.mode().clone()))
            .collect();
        let (to_close, to_open) = diff_config(&active, snapshot);
        for name in to_close {
            if let Some(port) = self.ports.remove(&name) {
                log::debug!("deleting interface {}", name);
                port.close();
            }
        }
        for cfg in to_open {
            log::debug!("adding interface {} as {:?}", cfg.name, cfg.mode);
            match PacketPort::open(&cfg, self.adapters.as_ref()) {
                Ok(mut port) => {
                    port.spawn_reader(self.events_tx.clone());
                    self.ports.insert(cfg.name.clone(), port);
                }
                Err(err) => log::error!("could not configure interface {} - {}", cfg.name, err),
            }
        }
    }
}

/// Which ports to close and which interface configs to open, given the
/// active set. An entry present on both sides with the same mode is left
/// alone; a mode change closes and reopens it.
fn diff_config(
    active: &HashMap<String, Mode>,
    desired: &ConfigSnapshot,
) -> (Vec<String>, Vec<InterfaceConfig>) {
    let mut to_close = Vec::new();
    for (name, mode) in active {
        let keep = desired.iter().any(|cfg| cfg.name == *name && cfg.mode == *mode);
        if !keep {
            to_close.push(name.clone());
        }
    }
    to_close.sort();
    let to_open = desired
        .iter()
        .filter(|cfg| active.get(&cfg.name) != Some(&cfg.mode))
        .cloned()
        .collect();
    (to_close, to_open)
}
