//! 链式组合的端到端验证。
//!
//! - 链式对象在本地分配，不发出请求；只有终端调用携带完整路径发往通道；
//! - 映射在合成期校验，非法映射以对应的 [`GenerationError`] 中止合成；
//! - 接收端按帧回放，中间帧返回的对象承接下一帧。

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use fleet_rpc::descriptor::{
    ConstructorDescriptor, ContractDescriptor, ContractKind, MethodDescriptor, ReturnDesc, TypeDesc,
};
use fleet_rpc::generation::GenerationCache;
use fleet_rpc::introspect::{IntrospectOptions, introspect};
use fleet_rpc::invocation::{JsonSerializer, RpcSender};
use fleet_rpc::server::{Handled, HandlerFailure, HandlerRegistry, LocalChannel, MethodTable, RpcDispatcher, arg};
use fleet_rpc::test_stubs::RecordingChannel;
use fleet_rpc::{
    ChannelSupplier, GenerationError, GenerationFlags, RemoteContract, RemoteObject, RpcChain, RpcConfig, RpcError,
    RpcFactory, RpcResult, SpecialArg, TransportError, args, contract,
};

fn mid() -> Arc<ContractDescriptor> {
    ContractDescriptor::builder("fleet::Mid", ContractKind::Trait)
        .method(b_method())
        .build()
}

fn a_method() -> MethodDescriptor {
    MethodDescriptor::new("a").returns(ReturnDesc::contract_ref("fleet::Mid", mid))
}

fn b_method() -> MethodDescriptor {
    MethodDescriptor::new("b").param::<i32>().returns(ReturnDesc::value::<i64>())
}

fn root() -> Arc<ContractDescriptor> {
    ContractDescriptor::builder("fleet::Root", ContractKind::Trait)
        .method(a_method())
        .build()
}

fn server() -> Arc<ContractDescriptor> {
    ContractDescriptor::builder("fleet::Server", ContractKind::AbstractBase)
        .constructor(ConstructorDescriptor::entry_point(vec![TypeDesc::of::<String>()]))
        .method(players_method())
        .build()
}

fn players_method() -> MethodDescriptor {
    MethodDescriptor::new("players").returns(ReturnDesc::value::<u32>())
}

fn shard() -> Arc<ContractDescriptor> {
    ContractDescriptor::builder("fleet::Shard", ContractKind::AbstractBase)
        .constructor(ConstructorDescriptor::entry_point(vec![
            TypeDesc::of::<u16>(),
            TypeDesc::of::<RpcSender>(),
            TypeDesc::of::<Option<RpcChain>>(),
            TypeDesc::of::<ChannelSupplier>(),
        ]))
        .method(players_method())
        .build()
}

fn server_method() -> MethodDescriptor {
    MethodDescriptor::new("server")
        .param::<String>()
        .returns(ReturnDesc::contract_ref("fleet::Server", server))
        .map_argument(0, 0)
}

fn shard_method() -> MethodDescriptor {
    MethodDescriptor::new("shard")
        .param::<u16>()
        .returns(ReturnDesc::contract_ref("fleet::Shard", shard))
        .map_special(SpecialArg::ChannelSupplier, 3)
        .map_argument(0, 0)
        .map_special(SpecialArg::ChainBase, 2)
        .map_special(SpecialArg::Sender, 1)
}

fn cluster() -> Arc<ContractDescriptor> {
    ContractDescriptor::builder("fleet::Cluster", ContractKind::Trait)
        .method(server_method())
        .method(shard_method())
        .build()
}

fn allocate(contract: fleet_rpc::descriptor::ContractRef, channel: Arc<dyn fleet_rpc::Channel>) -> RemoteObject {
    RpcFactory::new(RpcConfig::default())
        .implementation_of(contract)
        .target_channel(channel)
        .generate()
        .expect("generation")
        .allocate()
        .expect("allocation")
}

#[test]
fn terminal_call_carries_the_whole_path() {
    let channel = Arc::new(RecordingChannel::with_response(json!(10)));
    let origin = allocate(root, channel.clone());

    let mid = origin.chain_object("a", &a_method().signature(), Vec::new()).expect("chain");
    assert_eq!(channel.queries(), 0, "链式调用只在本地分配对象");
    assert_eq!(mid.base_chain().map(RpcChain::path), Some(vec!["a"]));
    assert!(origin.base_chain().is_none(), "根对象的链基不受影响");

    let value: i64 = mid.call("b", &b_method().signature(), args![5_i32]).expect("terminal call");
    assert_eq!(value, 10);

    let request = channel.last_request().expect("request recorded");
    assert_eq!(request.target, "fleet::Root");
    assert_eq!(request.path(), vec!["a", "b"]);
    let args: Vec<_> = request.frames.iter().map(|frame| frame.args.clone()).collect();
    assert_eq!(args, vec![vec![], vec![json!(5)]]);
    assert_eq!(request.frames[1].contract, "fleet::Mid");
}

#[test]
fn sibling_chains_do_not_interfere() {
    let channel = Arc::new(RecordingChannel::with_response(json!(1)));
    let cluster = allocate(cluster, channel.clone());
    let signature = server_method().signature();

    let lobby = cluster.chain_object("server", &signature, args!["lobby".to_owned()]).expect("chain");
    let survival = cluster.chain_object("server", &signature, args!["survival".to_owned()]).expect("chain");

    let _: u32 = lobby.call("players", &players_method().signature(), Vec::new()).expect("call");
    let _: u32 = survival.call("players", &players_method().signature(), Vec::new()).expect("call");

    let requests = channel.requests();
    assert_eq!(requests[0].frames[0].args, vec![json!("lobby")]);
    assert_eq!(requests[1].frames[0].args, vec![json!("survival")]);
    assert!(requests.iter().all(|request| request.frames.len() == 2));
}

#[test]
fn special_arguments_are_injected_at_allocation() {
    let channel = Arc::new(RecordingChannel::new());
    let cluster = allocate(cluster, channel.clone());

    let shard = cluster
        .chain_object("shard", &shard_method().signature(), args![7_u16])
        .expect("chain");

    assert_eq!(shard.constructor_args().len(), 4);
    assert_eq!(shard.constructor_arg(0).and_then(|arg| arg.downcast_ref::<u16>()), Some(&7));

    let sender = shard.constructor_arg(1).and_then(|arg| arg.as_sender()).expect("sender injected");
    assert!(sender.ptr_eq(shard.sender()));
    assert_eq!(sender.contract().name(), "fleet::Shard");

    let base = shard
        .constructor_arg(2)
        .and_then(|arg| arg.as_chain())
        .flatten()
        .expect("chain base injected");
    assert!(base.ptr_eq(shard.base_chain().expect("chained object has a base")));
    assert_eq!(base.path(), vec!["shard"]);

    let supplier = shard.constructor_arg(3).and_then(|arg| arg.as_channel()).expect("channel injected");
    assert!(supplier.ptr_eq(shard.channel_supplier()));
}

fn bad_cluster(method: MethodDescriptor) -> Arc<fleet_rpc::introspect::ClassContract> {
    let descriptor = ContractDescriptor::builder("fleet::BadCluster", ContractKind::Trait)
        .method(method)
        .build();
    Arc::new(introspect(&descriptor, &IntrospectOptions::new()).expect("introspection"))
}

fn to_server() -> MethodDescriptor {
    MethodDescriptor::new("server")
        .param::<u32>()
        .returns(ReturnDesc::contract_ref("fleet::Server", server))
}

fn generate(method: MethodDescriptor) -> Result<(), GenerationError> {
    GenerationCache::builder()
        .build()
        .get_or_generate(&bad_cluster(method), GenerationFlags::empty())
        .map(drop)
}

#[test]
fn mapping_to_a_missing_constructor_slot_is_rejected() {
    assert!(matches!(
        generate(to_server().map_argument(0, 5)),
        Err(GenerationError::ChainConstructorIndex { index: 5, .. })
    ));
}

#[test]
fn mapping_an_absent_argument_is_rejected() {
    assert!(matches!(
        generate(to_server().map_argument(3, 0)),
        Err(GenerationError::ChainArgumentOutOfRange {
            index: 3,
            available: 1,
            ..
        })
    ));
}

#[test]
fn mapping_an_incompatible_type_is_rejected() {
    let err = generate(to_server().map_argument(0, 0)).unwrap_err();
    assert!(matches!(err, GenerationError::ChainTypeMismatch { index: 0, .. }));
    assert!(err.to_string().contains("fleet::Server"));
}

#[test]
fn mapping_count_must_match_the_construction_point() {
    assert!(matches!(
        generate(to_server()),
        Err(GenerationError::ChainArityMismatch {
            expected: 1,
            actual: 0,
            ..
        })
    ));
}

#[test]
fn duplicate_mapping_targets_are_rejected() {
    fn pair() -> Arc<ContractDescriptor> {
        ContractDescriptor::builder("fleet::Pair", ContractKind::AbstractBase)
            .constructor(ConstructorDescriptor::entry_point(vec![TypeDesc::any(), TypeDesc::any()]))
            .build()
    }
    let method = MethodDescriptor::new("pair")
        .param::<u32>()
        .returns(ReturnDesc::contract_ref("fleet::Pair", pair))
        .map_argument(0, 0)
        .map_argument(0, 0);
    assert!(matches!(
        generate(method),
        Err(GenerationError::ChainConstructorIndex { index: 0, .. })
    ));
}

#[test]
fn target_without_construction_point_is_rejected() {
    fn orphan() -> Arc<ContractDescriptor> {
        ContractDescriptor::builder("fleet::Orphan", ContractKind::AbstractBase)
            .constructor(ConstructorDescriptor::new(vec![TypeDesc::of::<String>()]))
            .build()
    }
    let method = MethodDescriptor::new("orphan").returns(ReturnDesc::contract_ref("fleet::Orphan", orphan));
    assert!(matches!(
        generate(method),
        Err(GenerationError::MissingConstructor { ref contract }) if contract == "fleet::Orphan"
    ));
}

fn step_sender() -> RpcSender {
    let descriptor = (0..4)
        .fold(
            ContractDescriptor::builder("fleet::Steps", ContractKind::Trait),
            |builder, index| builder.method(MethodDescriptor::new(format!("m{index}"))),
        )
        .build();
    let contract = introspect(&descriptor, &IntrospectOptions::new()).expect("introspection");
    RpcSender::new(Arc::new(contract), Arc::new(JsonSerializer), None)
}

proptest! {
    /// `join` 只追加：每个前缀在后续拼接后保持原样。
    #[test]
    fn join_never_mutates_the_receiver(steps in prop::collection::vec(0usize..4, 1..12)) {
        let sender = step_sender();
        let rpc = |index: usize| {
            sender
                .invoke_unique(&format!("m{index}"), Vec::new())
                .expect("known step")
        };

        let mut prefixes = vec![RpcChain::of(rpc(steps[0]))];
        for step in &steps[1..] {
            let next = prefixes.last().expect("non-empty").join(rpc(*step));
            prefixes.push(next);
        }

        for (length, prefix) in prefixes.iter().enumerate() {
            prop_assert_eq!(prefix.len(), length + 1);
            let expected: Vec<String> = steps[..=length].iter().map(|step| format!("m{step}")).collect();
            prop_assert_eq!(prefix.path(), expected.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(prefix.root().method(), format!("m{}", steps[0]));
        }
    }
}

fn fleet_dispatcher() -> Arc<RpcDispatcher> {
    let handler = MethodTable::new("fleet::Cluster").on_any("server", |args| {
        let name: String = arg(args, 0)?;
        if name == "offline" {
            return Err(HandlerFailure::new("server.offline", format!("`{name}` is not running")));
        }
        let server = MethodTable::new("fleet::Server")
            .on(
                "players",
                players_method().signature(),
                move |_| Handled::value(&(name.len() as u32)),
            )
            .into_handler();
        Ok(Handled::Object(server))
    });
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("fleet::Cluster", handler.into_handler());
    Arc::new(RpcDispatcher::new(registry))
}

#[test]
fn dispatcher_replays_chains_over_a_local_channel() {
    let channel = LocalChannel::new(fleet_dispatcher(), "proxy-1");
    let cluster = allocate(cluster, channel.clone());
    let signature = server_method().signature();

    let players: u32 = cluster
        .chain_object("server", &signature, args!["survival".to_owned()])
        .and_then(|server| server.call("players", &players_method().signature(), Vec::new()))
        .expect("replayed call");
    assert_eq!(players, 8);

    let err = cluster
        .chain_object("server", &signature, args!["offline".to_owned()])
        .and_then(|server| server.call::<u32>("players", &players_method().signature(), Vec::new()))
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote { ref code, .. } if code == "server.offline"));

    channel.disconnect();
    let err = cluster
        .chain_object("server", &signature, args!["lobby".to_owned()])
        .and_then(|server| server.call::<u32>("players", &players_method().signature(), Vec::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Transport(TransportError::Disconnected { ref peer }) if peer == "proxy-1"
    ));
}

#[contract(name = "fleet::Profile")]
pub trait Profile {
    fn players(&self) -> RpcResult<u32>;
}

/// 声明为 `Profile` 子契约的具体实现。
fn profile_impl() -> Arc<ContractDescriptor> {
    ContractDescriptor::builder("fleet::ProfileImpl", ContractKind::AbstractBase)
        .parent(ProfileRemote::descriptor)
        .build()
}

fn profile_method() -> MethodDescriptor {
    MethodDescriptor::new("profile")
        .returns(ReturnDesc::contract::<ProfileRemote>())
        .chain_base_ref("fleet::ProfileImpl", profile_impl)
}

fn network() -> Arc<ContractDescriptor> {
    ContractDescriptor::builder("fleet::Network", ContractKind::Trait)
        .method(profile_method())
        .build()
}

#[test]
fn narrower_chain_base_is_adopted_as_the_declared_contract() {
    let channel = Arc::new(RecordingChannel::with_response(json!(12)));
    let network = allocate(network, channel.clone());

    let profile: ProfileRemote = network
        .chain("profile", &profile_method().signature(), Vec::new())
        .expect("typed chain");
    assert_eq!(profile.object().contract_name(), "fleet::ProfileImpl");
    assert_eq!(profile.players().expect("terminal call"), 12);

    let request = channel.last_request().expect("request recorded");
    assert_eq!(request.target, "fleet::Network");
    assert_eq!(request.path(), vec!["profile", "players"]);
}

#[test]
fn unrelated_chain_target_is_a_contract_mismatch() {
    let origin = allocate(root, Arc::new(RecordingChannel::new()));
    let err = origin
        .chain::<ProfileRemote>("a", &a_method().signature(), Vec::new())
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::ContractMismatch { ref expected, ref actual, .. }
            if expected == "fleet::Profile" && actual == "fleet::Mid"
    ));
}
