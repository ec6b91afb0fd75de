//! fleet-rpc 过程宏入口。
//!
//! # 设计意图（Why）
//! - Rust 没有运行期反射，契约描述表需要在编译期从 trait 定义推导；
//! - 手写描述表与手写代理方法容易出现签名不一致，宏保证两者来自同一份类型信息。
//!
//! # 集成方式（How）
//! - 在 trait 上标注 `#[fleet_rpc::contract]`，宏保留原 trait，并生成 `<Trait>Remote` 代理结构；
//! - 代理实现 `fleet_rpc::RemoteContract` 与原 trait，方法体转发到 `RemoteObject` 的对应调用；
//! - 方法上的 `#[rpc(...)]` 声明调用模式、链式映射与跳过标记，展开后会从 trait 中移除。

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{
    Error, FnArg, GenericArgument, Ident, ItemTrait, LitInt, LitStr, Pat, PathArguments, ReturnType,
    Token, TraitItem, TraitItemFn, Type, parse_macro_input, spanned::Spanned,
};

/// 从 trait 生成契约描述表与远程代理。
///
/// # 语义说明（What）
/// - **契约参数**：`name = "..."` 覆盖契约名称（默认 `module_path!()::Trait`），
///   `timeout_ms = N` 声明契约级超时，`constructor(T1, T2)` 把契约声明为带 RPC 构造入口的抽象基；
/// - **方法形状**：
///   - `-> RpcResult<T>`：同步调用；
///   - `-> RpcFuture<T>`：异步调用；
///   - 无返回值，或标注 `#[rpc(ignore_result)]`：单向调用，代理返回 `Default::default()`；
///   - `#[rpc(chain(...))]` 且返回 `RpcResult<OtherRemote>`：链式调用，括号内为映射列表，
///     例如 `chain(0 => 1, sender => 0)`，左侧为实参下标或 `sender`/`base`/`channel`；
///   - `#[rpc(skip)]` 或 `#[rpc(concrete)]`：必须带默认方法体，代理沿用默认实现；
/// - **前置条件**：方法必须以 `&self` 为接收者，参数为拥有所有权的类型，trait 不得有父 trait 或泛型。
///
/// # 风险提示（Trade-offs）
/// - 参数类型以 `std::any::type_name` 计算签名，跨编译产物的签名稳定性取决于编译器；
/// - 具体方法在代理上总是使用默认实现，需要远程化时请通过 `RemoteObject::call` 动态调用。
#[proc_macro_attribute]
pub fn contract(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = parse_macro_input!(attr as ContractOptions);
    let item = parse_macro_input!(item as ItemTrait);
    expand_contract(options, item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

#[derive(Default)]
struct ContractOptions {
    name: Option<LitStr>,
    timeout_ms: Option<LitInt>,
    /// 声明后契约成为抽象基，参数列表即 RPC 构造入口。
    constructor: Option<Vec<Type>>,
}

impl Parse for ContractOptions {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut options = ContractOptions::default();
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            if key == "constructor" {
                let content;
                syn::parenthesized!(content in input);
                let params = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
                options.constructor = Some(params.into_iter().collect());
                if !input.is_empty() {
                    input.parse::<Token![,]>()?;
                }
                continue;
            }
            input.parse::<Token![=]>()?;
            match key.to_string().as_str() {
                "name" => options.name = Some(input.parse()?),
                "timeout_ms" => options.timeout_ms = Some(input.parse()?),
                other => {
                    return Err(Error::new(
                        key.span(),
                        format!("#[fleet_rpc::contract] 不支持参数 `{other}`"),
                    ));
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(options)
    }
}

/// 链式映射的来源。
enum MappingSource {
    Argument(LitInt),
    Sender,
    Base,
    Channel,
}

struct Mapping {
    source: MappingSource,
    target: LitInt,
}

impl Parse for Mapping {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let source = if input.peek(LitInt) {
            MappingSource::Argument(input.parse()?)
        } else {
            let ident: Ident = input.parse()?;
            match ident.to_string().as_str() {
                "sender" => MappingSource::Sender,
                "base" => MappingSource::Base,
                "channel" => MappingSource::Channel,
                other => {
                    return Err(Error::new(
                        ident.span(),
                        format!("未知的特殊参数 `{other}`，可选 sender/base/channel"),
                    ));
                }
            }
        };
        input.parse::<Token![=>]>()?;
        let target = input.parse()?;
        Ok(Mapping { source, target })
    }
}

#[derive(Default)]
struct MethodOptions {
    chain: Option<Vec<Mapping>>,
    ignore_result: bool,
    skip: bool,
    concrete: bool,
}

impl MethodOptions {
    fn parse_attr(&mut self, attr: &syn::Attribute) -> syn::Result<()> {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignore_result") {
                self.ignore_result = true;
            } else if meta.path.is_ident("skip") {
                self.skip = true;
            } else if meta.path.is_ident("concrete") {
                self.concrete = true;
            } else if meta.path.is_ident("chain") {
                let mappings = if meta.input.peek(syn::token::Paren) {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    Punctuated::<Mapping, Token![,]>::parse_terminated(&content)?
                        .into_iter()
                        .collect()
                } else {
                    Vec::new()
                };
                self.chain = Some(mappings);
            } else {
                return Err(meta.error("#[rpc] 只接受 chain/ignore_result/skip/concrete"));
            }
            Ok(())
        })
    }
}

/// 方法返回值的形状。
enum Shape {
    Unit,
    Sync(Type),
    Async(Type),
    Ignored(Type),
    Chain(Type),
}

fn expand_contract(options: ContractOptions, mut item: ItemTrait) -> Result<TokenStream2, Error> {
    if !item.supertraits.is_empty() {
        return Err(Error::new(
            item.supertraits.span(),
            "#[fleet_rpc::contract] 暂不支持父 trait，请在描述表中以 parent 声明",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(Error::new(
            item.generics.span(),
            "#[fleet_rpc::contract] 不支持泛型 trait",
        ));
    }

    let trait_ident = item.ident.clone();
    let remote_ident = format_ident!("{}Remote", trait_ident);
    let vis = item.vis.clone();
    let trait_name = trait_ident.to_string();
    let contract_name = match &options.name {
        Some(name) => quote!(#name),
        None => quote!(::core::concat!(::core::module_path!(), "::", #trait_name)),
    };
    let timeout = options.timeout_ms.as_ref().map(|ms| {
        quote!(.timeout(::std::time::Duration::from_millis(#ms)))
    });
    let (kind, constructor) = match &options.constructor {
        Some(params) => (
            quote!(::fleet_rpc::descriptor::ContractKind::AbstractBase),
            Some(quote! {
                .constructor(::fleet_rpc::descriptor::ConstructorDescriptor::entry_point(::std::vec![
                    #(::fleet_rpc::descriptor::TypeDesc::of::<#params>()),*
                ]))
            }),
        ),
        None => (quote!(::fleet_rpc::descriptor::ContractKind::Trait), None),
    };

    let mut descriptor_fns = Vec::new();
    let mut method_registrations = Vec::new();
    let mut proxies = Vec::new();

    for trait_item in item.items.iter_mut() {
        let TraitItem::Fn(method) = trait_item else {
            continue;
        };
        let method_options = take_rpc_options(method)?;
        let expanded = expand_method(&remote_ident, method, &method_options)?;
        let descriptor_ident = expanded.descriptor_ident.clone();
        descriptor_fns.push(expanded.descriptor_fn);
        method_registrations.push(quote!(.method(#remote_ident::#descriptor_ident())));
        if let Some(proxy) = expanded.proxy {
            proxies.push(proxy);
        }
    }

    Ok(quote! {
        #item

        #[doc = concat!("`", #trait_name, "` 的远程代理，由 `#[fleet_rpc::contract]` 生成。")]
        #[derive(Clone, Debug)]
        #vis struct #remote_ident {
            object: ::fleet_rpc::RemoteObject,
        }

        impl #remote_ident {
            #(#descriptor_fns)*
        }

        impl ::fleet_rpc::RemoteContract for #remote_ident {
            const CONTRACT_NAME: &'static str = #contract_name;

            fn descriptor() -> ::std::sync::Arc<::fleet_rpc::descriptor::ContractDescriptor> {
                static DESCRIPTOR: ::std::sync::OnceLock<
                    ::std::sync::Arc<::fleet_rpc::descriptor::ContractDescriptor>,
                > = ::std::sync::OnceLock::new();
                ::std::sync::Arc::clone(DESCRIPTOR.get_or_init(|| {
                    ::fleet_rpc::descriptor::ContractDescriptor::builder(
                        <Self as ::fleet_rpc::RemoteContract>::CONTRACT_NAME,
                        #kind,
                    )
                    #constructor
                    #timeout
                    #(#method_registrations)*
                    .build()
                }))
            }

            fn from_object(object: ::fleet_rpc::RemoteObject) -> Self {
                Self { object }
            }

            fn object(&self) -> &::fleet_rpc::RemoteObject {
                &self.object
            }
        }

        impl #trait_ident for #remote_ident {
            #(#proxies)*
        }
    })
}

/// 取出并移除方法上的 `#[rpc(...)]`。
fn take_rpc_options(method: &mut TraitItemFn) -> Result<MethodOptions, Error> {
    let mut options = MethodOptions::default();
    let mut kept = Vec::with_capacity(method.attrs.len());
    for attr in method.attrs.drain(..) {
        if attr.path().is_ident("rpc") {
            options.parse_attr(&attr)?;
        } else {
            kept.push(attr);
        }
    }
    method.attrs = kept;
    Ok(options)
}

struct ExpandedMethod {
    descriptor_ident: Ident,
    descriptor_fn: TokenStream2,
    proxy: Option<TokenStream2>,
}

fn expand_method(
    remote_ident: &Ident,
    method: &TraitItemFn,
    options: &MethodOptions,
) -> Result<ExpandedMethod, Error> {
    let sig = &method.sig;
    if !sig.generics.params.is_empty() || sig.asyncness.is_some() {
        return Err(Error::new(
            sig.span(),
            "远程操作不能是泛型或 async fn，异步操作请返回 RpcFuture<T>",
        ));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(Error::new(sig.span(), "远程操作必须以 `&self` 为接收者"));
        }
    }

    let mut arg_idents = Vec::new();
    let mut arg_types = Vec::new();
    for input in inputs {
        let FnArg::Typed(pat_type) = input else {
            return Err(Error::new(input.span(), "意外的接收者"));
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(Error::new(pat_type.pat.span(), "远程操作的参数必须是简单标识符"));
        };
        if matches!(pat_type.ty.as_ref(), Type::Reference(_)) {
            return Err(Error::new(
                pat_type.ty.span(),
                "远程操作的参数必须拥有所有权，引用无法跨调用链保存",
            ));
        }
        arg_idents.push(pat_ident.ident.clone());
        arg_types.push(pat_type.ty.as_ref().clone());
    }

    let method_name = sig.ident.to_string();
    let descriptor_ident = format_ident!("__fleet_rpc_method_{}", sig.ident);
    let shape = classify(sig, options)?;

    let returns = match &shape {
        Shape::Unit => quote!(::fleet_rpc::descriptor::ReturnDesc::Unit),
        Shape::Sync(ty) | Shape::Ignored(ty) => quote!(::fleet_rpc::descriptor::ReturnDesc::value::<#ty>()),
        Shape::Async(ty) => quote!(::fleet_rpc::descriptor::ReturnDesc::future::<#ty>()),
        Shape::Chain(ty) => quote!(::fleet_rpc::descriptor::ReturnDesc::contract::<#ty>()),
    };

    let mut modifiers = Vec::new();
    if matches!(shape, Shape::Unit | Shape::Ignored(_)) {
        modifiers.push(quote!(.ignore_result()));
    }
    let local = options.skip || options.concrete;
    if local {
        if method.default.is_none() {
            return Err(Error::new(
                sig.span(),
                "标注 skip 或 concrete 的操作必须提供默认方法体",
            ));
        }
        modifiers.push(quote!(.concrete()));
    }
    if options.skip {
        modifiers.push(quote!(.skip()));
    }
    if let (Shape::Chain(_), Some(mappings)) = (&shape, &options.chain) {
        for mapping in mappings {
            let target = &mapping.target;
            modifiers.push(match &mapping.source {
                MappingSource::Argument(index) => quote!(.map_argument(#index, #target)),
                MappingSource::Sender => {
                    quote!(.map_special(::fleet_rpc::SpecialArg::Sender, #target))
                }
                MappingSource::Base => {
                    quote!(.map_special(::fleet_rpc::SpecialArg::ChainBase, #target))
                }
                MappingSource::Channel => {
                    quote!(.map_special(::fleet_rpc::SpecialArg::ChannelSupplier, #target))
                }
            });
        }
    }

    let descriptor_fn = quote! {
        #[doc(hidden)]
        pub fn #descriptor_ident() -> ::fleet_rpc::descriptor::MethodDescriptor {
            ::fleet_rpc::descriptor::MethodDescriptor::new(#method_name)
                #(.param::<#arg_types>())*
                .returns(#returns)
                #(#modifiers)*
        }
    };

    if local {
        return Ok(ExpandedMethod {
            descriptor_ident,
            descriptor_fn,
            proxy: None,
        });
    }

    let call = match &shape {
        Shape::Unit => quote!(object.call_ignored::<()>(#method_name, signature, args)),
        Shape::Ignored(ty) => quote!(object.call_ignored::<#ty>(#method_name, signature, args)),
        Shape::Sync(ty) => quote!(object.call::<#ty>(#method_name, signature, args)),
        Shape::Async(ty) => quote!(object.call_async::<#ty>(#method_name, signature, args)),
        Shape::Chain(ty) => quote!(object.chain::<#ty>(#method_name, signature, args)),
    };
    let attrs = &method.attrs;
    let proxy = quote! {
        #(#attrs)*
        #sig {
            static SIGNATURE: ::std::sync::OnceLock<::fleet_rpc::descriptor::Signature> =
                ::std::sync::OnceLock::new();
            let signature = SIGNATURE.get_or_init(|| #remote_ident::#descriptor_ident().signature());
            let args: ::std::vec::Vec<::fleet_rpc::Arg> = ::std::vec![#(::fleet_rpc::Arg::new(#arg_idents)),*];
            let object = ::fleet_rpc::RemoteContract::object(self);
            #call
        }
    };

    Ok(ExpandedMethod {
        descriptor_ident,
        descriptor_fn,
        proxy: Some(proxy),
    })
}

fn classify(sig: &syn::Signature, options: &MethodOptions) -> Result<Shape, Error> {
    let ty = match &sig.output {
        ReturnType::Default => {
            if options.chain.is_some() {
                return Err(Error::new(sig.span(), "链式操作必须返回 RpcResult<OtherRemote>"));
            }
            return Ok(Shape::Unit);
        }
        ReturnType::Type(_, ty) => ty.as_ref(),
    };

    if options.chain.is_some() {
        return match wrapped(ty, "RpcResult") {
            Some(inner) => Ok(Shape::Chain(inner)),
            None => Err(Error::new(ty.span(), "链式操作必须返回 RpcResult<OtherRemote>")),
        };
    }
    if options.ignore_result {
        return Ok(Shape::Ignored(ty.clone()));
    }
    if let Some(inner) = wrapped(ty, "RpcResult") {
        return Ok(Shape::Sync(inner));
    }
    if let Some(inner) = wrapped(ty, "RpcFuture") {
        return Ok(Shape::Async(inner));
    }
    if options.skip || options.concrete {
        // 本地操作的返回类型不参与远程调用，仅用于签名。
        return Ok(Shape::Ignored(ty.clone()));
    }
    Err(Error::new(
        ty.span(),
        "远程操作必须返回 RpcResult<T>、RpcFuture<T>，或标注 #[rpc(ignore_result)]",
    ))
}

/// 若 `ty` 形如 `Wrapper<T>`（允许带路径前缀），返回 `T`。
fn wrapped(ty: &Type, wrapper: &str) -> Option<Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner.clone()),
        _ => None,
    }
}
