//! A node: the composition point of the network bridge.
//!
//! A [`NetNode`] owns one listening address, the binding table every link's
//! demultiplexer routes into, a tag allocator, a pool of outbound links
//! keyed by address (opened once, reused for every channel to that peer),
//! and optionally a connection to a name server.
//!
//! Input ends are created here and advertised by location or by name;
//! output ends resolve a location (directly or through the name service),
//! reuse or open a link, and bind a fresh poison cell on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use tryst::{BufferPolicy, buffered_with_immunity};

use crate::cns::NameClient;
use crate::config::LinkConfig;
use crate::demux::{BindingTable, TypedSink, spawn_demux};
use crate::endpoint::{ChannelLocation, NetChannelReader, NetChannelWriter};
use crate::error::{LinkResult, NameError, NetResult};
use crate::link::Link;
use crate::mux::{MuxHandle, PoisonCell, SessionShared, spawn_mux};
use crate::wire::FIRST_DYNAMIC_TAG;

/// One pooled link session.
#[derive(Clone)]
struct LinkEntry {
    mux: MuxHandle,
    shared: Arc<SessionShared>,
}

/// A process-network node bridging local channels over links.
pub struct NetNode {
    addr: String,
    config: LinkConfig,
    table: Arc<BindingTable>,
    links: tokio::sync::Mutex<HashMap<String, LinkEntry>>,
    next_tag: AtomicU32,
    name_client: Option<tokio::sync::Mutex<NameClient>>,
    accept_task: JoinHandle<()>,
}

impl NetNode {
    /// Bind a node on `addr` and start accepting links.
    ///
    /// # Errors
    ///
    /// Surfaces the listener's I/O error.
    pub async fn bind(addr: &str) -> LinkResult<Self> {
        Self::bind_with_config(addr, LinkConfig::default()).await
    }

    /// Like [`NetNode::bind`] with explicit link configuration.
    ///
    /// # Errors
    ///
    /// Surfaces the listener's I/O error.
    pub async fn bind_with_config(addr: &str, config: LinkConfig) -> LinkResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?.to_string();
        let table = BindingTable::new();
        tracing::debug!(%addr, "node listening");

        let accept_table = Arc::clone(&table);
        let accept_config = config.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "accepted link");
                        let link = Link::from_stream(
                            stream,
                            peer.to_string(),
                            accept_config.clone(),
                        );
                        let (sender, receiver) = link.split();
                        let shared = SessionShared::new(peer.to_string());
                        let mux = spawn_mux(sender, Arc::clone(&shared));
                        spawn_demux(receiver, Arc::clone(&accept_table), shared, mux);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(Self {
            addr,
            config,
            table,
            links: tokio::sync::Mutex::new(HashMap::new()),
            next_tag: AtomicU32::new(FIRST_DYNAMIC_TAG),
            name_client: None,
            accept_task,
        })
    }

    /// Bind a node and attach it to the name server at `cns_addr`.
    ///
    /// # Errors
    ///
    /// Fails on listener I/O errors or if the name server is unreachable.
    pub async fn bind_with_name_server(addr: &str, cns_addr: &str) -> NetResult<Self> {
        let mut node = Self::bind(addr).await?;
        let client = NameClient::connect(cns_addr, node.config.clone()).await?;
        node.name_client = Some(tokio::sync::Mutex::new(client));
        Ok(node)
    }

    /// The address this node listens on (useful with port 0).
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Create a network input channel with the given buffering policy.
    ///
    /// Returns the reader and the location remote writers use to reach it.
    /// The policy is part of the channel's observable behavior and must be
    /// chosen deliberately; see [`BufferPolicy`].
    pub fn open_input<T>(&self, policy: BufferPolicy) -> (NetChannelReader<T>, ChannelLocation)
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.open_input_with_immunity(policy, 0)
    }

    /// Like [`NetNode::open_input`], with the reader end's immunity level.
    pub fn open_input_with_immunity<T>(
        &self,
        policy: BufferPolicy,
        immunity: u32,
    ) -> (NetChannelReader<T>, ChannelLocation)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        // The feed side shares the reader's immunity: a signal the reader
        // absorbs must not starve it by killing the feed instead.
        let (writer, reader) = buffered_with_immunity::<T>(policy, immunity, immunity);
        self.table
            .bind(tag, Arc::new(TypedSink::new(writer)))
            .expect("freshly allocated tag is unbound");

        let location = ChannelLocation {
            addr: self.addr.clone(),
            tag,
        };
        tracing::debug!(%location, "input channel bound");
        (
            NetChannelReader::new(reader, location.clone(), Arc::clone(&self.table)),
            location,
        )
    }

    /// Create a network input channel and register it under `name`.
    ///
    /// # Errors
    ///
    /// Name-service faults are returned to the caller; the input is unbound
    /// again on failure.
    pub async fn advertise<T>(
        &self,
        name: &str,
        policy: BufferPolicy,
    ) -> NetResult<NetChannelReader<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (reader, location) = self.open_input(policy);
        let client = self.name_client()?;
        client.lock().await.register(name, &location).await?;
        Ok(reader)
    }

    /// Open a network output channel to an explicit location.
    ///
    /// # Errors
    ///
    /// Fails if no link to the location's address can be established.
    pub async fn open_output<T>(&self, location: &ChannelLocation) -> NetResult<NetChannelWriter<T>>
    where
        T: Serialize + Send + 'static,
    {
        self.open_output_with_immunity(location, 0).await
    }

    /// Like [`NetNode::open_output`], with the writer end's immunity level.
    ///
    /// # Errors
    ///
    /// Fails if no link to the location's address can be established.
    pub async fn open_output_with_immunity<T>(
        &self,
        location: &ChannelLocation,
        immunity: u32,
    ) -> NetResult<NetChannelWriter<T>>
    where
        T: Serialize + Send + 'static,
    {
        let entry = self.link_to(&location.addr).await?;
        let cell = Arc::new(PoisonCell::new());
        entry.shared.register_outbound(location.tag, Arc::clone(&cell));
        tracing::debug!(%location, "output channel opened");
        Ok(NetChannelWriter::new(location.tag, entry.mux, cell, immunity))
    }

    /// Resolve `name` through the name service and open an output to it.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is unbound, plus any link-establishment fault.
    pub async fn open_output_named<T>(&self, name: &str) -> NetResult<NetChannelWriter<T>>
    where
        T: Serialize + Send + 'static,
    {
        let client = self.name_client()?;
        let location = {
            let mut client = client.lock().await;
            client.resolve(name).await?
        };
        self.open_output(&location).await
    }

    /// Retract a name this node registered.
    ///
    /// # Errors
    ///
    /// `NotOwner` if the binding belongs to someone else.
    pub async fn deregister(&self, name: &str) -> NetResult<()> {
        let client = self.name_client()?;
        client.lock().await.deregister(name).await?;
        Ok(())
    }

    fn name_client(&self) -> Result<&tokio::sync::Mutex<NameClient>, NameError> {
        self.name_client
            .as_ref()
            .ok_or_else(|| NameError::Transport("node has no name server attached".to_string()))
    }

    /// Open or reuse the pooled link to `addr`. A faulted pooled link is
    /// replaced by a fresh dial; its already-bound ends keep their synthetic
    /// poison.
    async fn link_to(&self, addr: &str) -> LinkResult<LinkEntry> {
        let mut links = self.links.lock().await;
        if let Some(entry) = links.get(addr) {
            if entry.shared.check_open().is_ok() {
                return Ok(entry.clone());
            }
            tracing::debug!(peer = %addr, "pooled link faulted, redialing");
        }

        let link = Link::connect(addr, self.config.clone()).await?;
        let (sender, receiver) = link.split();
        let shared = SessionShared::new(addr.to_string());
        let mux = spawn_mux(sender, Arc::clone(&shared));
        spawn_demux(
            receiver,
            Arc::clone(&self.table),
            Arc::clone(&shared),
            mux.clone(),
        );

        let entry = LinkEntry { mux, shared };
        links.insert(addr.to_string(), entry.clone());
        Ok(entry)
    }
}

impl Drop for NetNode {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
