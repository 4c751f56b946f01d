//! Name service tests through the wire protocol: the registry properties as
//! observed by real clients over TCP.

use tryst_net::{ChannelLocation, LinkConfig, NameClient, NameError, NameServer};

fn location(tag: u32) -> ChannelLocation {
    ChannelLocation {
        addr: "127.0.0.1:4500".to_string(),
        tag,
    }
}

async fn client(server: &NameServer) -> NameClient {
    NameClient::connect(server.addr(), LinkConfig::default())
        .await
        .expect("connect client")
}

#[tokio::test]
async fn register_then_resolve_returns_location() {
    let server = NameServer::bind("127.0.0.1:0").await.expect("bind");
    let mut owner = client(&server).await;

    owner.register("X", &location(8)).await.expect("register");
    assert_eq!(owner.resolve("X").await, Ok(location(8)));

    // Any other party resolves the location too; location, not ownership.
    let mut visitor = client(&server).await;
    assert_eq!(visitor.resolve("X").await, Ok(location(8)));
}

#[tokio::test]
async fn resolve_unbound_name_is_not_found() {
    let server = NameServer::bind("127.0.0.1:0").await.expect("bind");
    let mut c = client(&server).await;

    assert_eq!(
        c.resolve("nobody").await,
        Err(NameError::NotFound {
            name: "nobody".to_string()
        })
    );
}

#[tokio::test]
async fn second_owner_gets_name_in_use() {
    let server = NameServer::bind("127.0.0.1:0").await.expect("bind");
    let mut first = client(&server).await;
    let mut second = client(&server).await;

    first.register("X", &location(8)).await.expect("register");
    assert_eq!(
        second.register("X", &location(9)).await,
        Err(NameError::NameInUse {
            name: "X".to_string()
        })
    );

    // The original binding survives the attempt.
    assert_eq!(second.resolve("X").await, Ok(location(8)));
}

#[tokio::test]
async fn non_owner_deregister_is_refused_and_binding_intact() {
    let server = NameServer::bind("127.0.0.1:0").await.expect("bind");
    let mut owner = client(&server).await;
    let mut intruder = client(&server).await;

    owner.register("X", &location(8)).await.expect("register");

    assert_eq!(
        intruder.deregister("X").await,
        Err(NameError::NotOwner {
            name: "X".to_string()
        })
    );
    assert_eq!(intruder.resolve("X").await, Ok(location(8)));

    // The owner retracts it, freeing the name.
    owner.deregister("X").await.expect("deregister");
    assert_eq!(
        owner.resolve("X").await,
        Err(NameError::NotFound {
            name: "X".to_string()
        })
    );
    intruder.register("X", &location(9)).await.expect("register");
}

#[tokio::test]
async fn sequential_requests_on_one_connection() {
    let server = NameServer::bind("127.0.0.1:0").await.expect("bind");
    let mut c = client(&server).await;

    for tag in 0..20 {
        let name = format!("chan.{tag}");
        c.register(&name, &location(tag)).await.expect("register");
    }
    for tag in 0..20 {
        let name = format!("chan.{tag}");
        assert_eq!(c.resolve(&name).await, Ok(location(tag)));
    }
    assert_eq!(server.registry().len(), 20);
}
