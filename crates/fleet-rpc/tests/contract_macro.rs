use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use fleet_rpc::descriptor::{ContractKind, Signature, TypeDesc};
use fleet_rpc::test_stubs::{EchoChannel, RecordingChannel};
use fleet_rpc::{
    Channel, InvocationMode, RemoteContract, RpcConfig, RpcFactory, RpcFuture, RpcResult, RpcSender, contract,
};

#[contract(name = "fleet::Lobby", timeout_ms = 500)]
pub trait Lobby {
    fn greet(&self, name: String) -> RpcResult<(String, Vec<String>)>;

    fn player_count(&self) -> RpcFuture<u32>;

    fn broadcast(&self, message: String);

    #[rpc(ignore_result)]
    fn kick(&self, player: String) -> bool;

    #[rpc(chain(0 => 0, sender => 1))]
    fn server(&self, name: String) -> RpcResult<ServerRemote>;

    #[rpc(skip)]
    fn motd(&self) -> String {
        "welcome".to_owned()
    }
}

#[contract(constructor(String, RpcSender))]
pub trait Server {
    fn players(&self) -> RpcResult<u32>;
}

fn lobby(channel: Arc<dyn Channel>) -> LobbyRemote {
    RpcFactory::new(RpcConfig::default())
        .implementation::<LobbyRemote>()
        .target_channel(channel)
        .generate()
        .expect("generation")
        .allocate_as::<LobbyRemote>()
        .expect("allocation")
}

#[test]
fn descriptor_reflects_the_trait() {
    let descriptor = LobbyRemote::descriptor();
    assert_eq!(LobbyRemote::CONTRACT_NAME, "fleet::Lobby");
    assert_eq!(descriptor.kind(), ContractKind::Trait);
    assert_eq!(descriptor.timeout(), Some(Duration::from_millis(500)));

    let names: Vec<_> = descriptor.methods().iter().map(|method| method.name()).collect();
    assert_eq!(names, vec!["greet", "player_count", "broadcast", "kick", "server", "motd"]);

    let greet = &descriptor.methods()[0];
    assert_eq!(
        greet.signature(),
        Signature::of(&[TypeDesc::of::<String>()], &TypeDesc::of::<(String, Vec<String>)>())
    );
    let motd = descriptor.methods()[5].modifiers();
    assert!(motd.skipped && motd.concrete);

    assert!(Arc::ptr_eq(&descriptor, &LobbyRemote::descriptor()), "描述表只构建一次");
}

#[test]
fn constructor_option_declares_an_abstract_base() {
    let descriptor = ServerRemote::descriptor();
    assert!(ServerRemote::CONTRACT_NAME.ends_with("::Server"));
    assert_eq!(descriptor.kind(), ContractKind::AbstractBase);
    let point = descriptor.construction_point().expect("construction point");
    assert!(point.is_marked());
    assert_eq!(point.params(), &[TypeDesc::of::<String>(), TypeDesc::of::<RpcSender>()]);
}

#[test]
fn invocation_modes_follow_method_shapes() {
    let allocator = RpcFactory::new(RpcConfig::default())
        .implementation::<LobbyRemote>()
        .target_channel(EchoChannel::new())
        .generate()
        .expect("generation");
    let contract = allocator.sender().contract();
    let mode = |name: &str| {
        contract
            .methods_named(name)
            .next()
            .map(|method| method.mode())
            .expect("declared operation")
    };

    assert_eq!(mode("greet"), InvocationMode::Sync);
    assert_eq!(mode("player_count"), InvocationMode::Async);
    assert_eq!(mode("broadcast"), InvocationMode::FireAndForget);
    assert_eq!(mode("kick"), InvocationMode::FireAndForget);
    assert_eq!(mode("server"), InvocationMode::Sync);
    assert!(contract.methods_named("motd").next().is_none(), "跳过的操作不参与合成");
}

#[test]
fn generated_proxy_forwards_calls() {
    let lobby = lobby(EchoChannel::new());
    assert_eq!(
        lobby.greet("Ada".to_owned()).expect("echo"),
        ("greet".to_owned(), vec!["Ada".to_owned()])
    );
    assert_eq!(lobby.motd(), "welcome");
}

#[test]
fn one_way_and_async_methods() {
    let channel = Arc::new(RecordingChannel::with_response(json!(17)));
    let lobby = lobby(channel.clone());

    lobby.broadcast("restart in 5".to_owned());
    assert!(!lobby.kick("Steve".to_owned()), "单向调用返回默认值");
    assert_eq!(channel.sends(), 2);

    let count = futures::executor::block_on(lobby.player_count()).expect("async call");
    assert_eq!(count, 17);
    assert_eq!(channel.queries(), 1);
}

#[test]
fn chained_proxy_receives_mapped_constructor_arguments() {
    let channel = Arc::new(RecordingChannel::with_response(json!(64)));
    let lobby = lobby(channel.clone());

    let server = lobby.server("survival".to_owned()).expect("chain");
    let object = server.object();
    assert_eq!(
        object.constructor_arg(0).and_then(|arg| arg.downcast_ref::<String>()).map(String::as_str),
        Some("survival")
    );
    assert!(
        object
            .constructor_arg(1)
            .and_then(|arg| arg.as_sender())
            .is_some_and(|sender| sender.ptr_eq(object.sender()))
    );
    assert_eq!(channel.queries(), 0);

    assert_eq!(server.players().expect("terminal call"), 64);
    let request = channel.last_request().expect("request recorded");
    assert_eq!(request.target, "fleet::Lobby");
    assert_eq!(request.path(), vec!["server", "players"]);
}
