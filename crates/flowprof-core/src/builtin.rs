//! Core object model and methods implemented by hooks
//!
//! Hooks follow a registry of trait objects: each implements
//! [`BuiltinMethod`] and is attached to the method entity it replaces.

use std::fmt;
use std::rc::Rc;
use tracing::debug;

use crate::ast::SuperclassRef;
use crate::env::{ConstKey, CoreModules, DefOrigin, GlobalEnv, MethodKey, ModuleDecl};
use crate::error::Result;
use crate::graph::{Changes, NodeId, SiteKey, SiteKind, Type, VertexId};
use crate::sites::CallSite;

/// What a hook sees of the call being resolved
#[derive(Debug)]
pub struct CallInfo<'a> {
    pub node: NodeId,
    pub recv_ty: &'a Type,
    pub args: &'a [VertexId],
    pub splats: &'a [bool],
    pub keywords: Option<VertexId>,
    pub block: Option<VertexId>,
    pub ret: VertexId,
}

/// A method whose effect on the graph is computed in code
pub trait BuiltinMethod: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Records the effect of one call in the caller's `changes`
    fn call(&self, env: &mut GlobalEnv, changes: &mut Changes, call: &CallInfo<'_>) -> Result<()>;
}

/// `Class#new`: the instance flows to the result and `initialize` is called on it
#[derive(Debug)]
pub struct ClassNew;

impl BuiltinMethod for ClassNew {
    fn name(&self) -> &'static str {
        "Class#new"
    }

    fn call(&self, env: &mut GlobalEnv, changes: &mut Changes, call: &CallInfo<'_>) -> Result<()> {
        let Type::Singleton(module) = call.recv_ty else {
            return Ok(());
        };
        if !env.module(*module).is_class() {
            return Ok(());
        }
        let instance = env.source(&[Type::instance(*module)]);
        let ret = changes.fresh_vertex(env, "initialize-ret");
        changes.add_site(
            SiteKey::new("initialize", module.0),
            call.node,
            SiteKind::Call(CallSite {
                recv: instance,
                name: "initialize".to_string(),
                args: Rc::from(call.args),
                splats: Rc::from(call.splats),
                keywords: call.keywords,
                block: call.block,
                subclasses: false,
                ret,
            }),
        );
        changes.add_edge(instance, call.ret);
        Ok(())
    }
}

/// `BasicObject#initialize`, accepting anything
#[derive(Debug)]
pub struct DefaultInitialize;

impl BuiltinMethod for DefaultInitialize {
    fn name(&self) -> &'static str {
        "BasicObject#initialize"
    }

    fn call(&self, _env: &mut GlobalEnv, _changes: &mut Changes, _call: &CallInfo<'_>) -> Result<()> {
        Ok(())
    }
}

/// `Proc#call`, also used for `yield`
#[derive(Debug)]
pub struct ProcCall;

impl BuiltinMethod for ProcCall {
    fn name(&self) -> &'static str {
        "Proc#call"
    }

    fn call(&self, env: &mut GlobalEnv, changes: &mut Changes, call: &CallInfo<'_>) -> Result<()> {
        let Type::Proc(block) = call.recv_ty else {
            return Ok(());
        };
        let Some(record) = env.block(*block).cloned() else {
            return Ok(());
        };
        for (&arg, &param) in call.args.iter().zip(&record.params) {
            changes.add_edge(arg, param);
        }
        changes.add_edge(record.ret, call.ret);
        Ok(())
    }
}

fn array_elem(env: &GlobalEnv, ty: &Type) -> Option<VertexId> {
    match ty {
        Type::Array { elem, .. } => Some(*elem),
        Type::Instance { module, args } if *module == env.core().array => args.first().copied(),
        _ => None,
    }
}

/// `Array#[]`
#[derive(Debug)]
pub struct ArrayAref;

impl BuiltinMethod for ArrayAref {
    fn name(&self) -> &'static str {
        "Array#[]"
    }

    fn call(&self, env: &mut GlobalEnv, changes: &mut Changes, call: &CallInfo<'_>) -> Result<()> {
        if let Some(elem) = array_elem(env, call.recv_ty) {
            changes.add_edge(elem, call.ret);
        }
        Ok(())
    }
}

/// `Array#<<`: the argument joins the element type and the array is returned
#[derive(Debug)]
pub struct ArrayPush;

impl BuiltinMethod for ArrayPush {
    fn name(&self) -> &'static str {
        "Array#<<"
    }

    fn call(&self, env: &mut GlobalEnv, changes: &mut Changes, call: &CallInfo<'_>) -> Result<()> {
        if let (Some(elem), Some(&arg)) = (array_elem(env, call.recv_ty), call.args.first()) {
            changes.add_edge(arg, elem);
        }
        let recv = changes.type_source(env, "array-push", call.recv_ty.clone());
        changes.add_edge(recv, call.ret);
        Ok(())
    }
}

fn class_decl(superclass: Option<&str>, type_params: &[&str]) -> ModuleDecl {
    ModuleDecl {
        is_class: true,
        superclass: superclass.map(|s| SuperclassRef {
            cpath: vec![s.to_string()],
            args: Vec::new(),
        }),
        type_params: type_params.iter().map(|p| p.to_string()).collect(),
    }
}

/// Creates the core classes and attaches the builtin hooks
pub(crate) fn deploy(env: &mut GlobalEnv) {
    let core = CoreModules {
        basic_object: env.resolve_cpath(&["BasicObject"]),
        object: env.resolve_cpath(&["Object"]),
        module: env.resolve_cpath(&["Module"]),
        class: env.resolve_cpath(&["Class"]),
        kernel: env.resolve_cpath(&["Kernel"]),
        integer: env.resolve_cpath(&["Integer"]),
        float: env.resolve_cpath(&["Float"]),
        string: env.resolve_cpath(&["String"]),
        symbol: env.resolve_cpath(&["Symbol"]),
        nil: env.resolve_cpath(&["NilClass"]),
        true_class: env.resolve_cpath(&["TrueClass"]),
        false_class: env.resolve_cpath(&["FalseClass"]),
        array: env.resolve_cpath(&["Array"]),
        hash: env.resolve_cpath(&["Hash"]),
        proc_class: env.resolve_cpath(&["Proc"]),
    };
    env.core = core.clone();

    let origin = DefOrigin::Builtin;
    env.add_module_decl(core.basic_object, origin, class_decl(None, &[]));
    env.add_module_decl(core.object, origin, class_decl(Some("BasicObject"), &[]));
    env.add_module_decl(core.module, origin, class_decl(Some("Object"), &[]));
    env.add_module_decl(core.class, origin, class_decl(Some("Module"), &[]));
    env.add_module_decl(
        core.kernel,
        origin,
        ModuleDecl {
            is_class: false,
            superclass: None,
            type_params: Vec::new(),
        },
    );
    env.add_include(core.object, origin, core.kernel, Vec::new());
    for module in [
        core.integer,
        core.float,
        core.string,
        core.symbol,
        core.nil,
        core.true_class,
        core.false_class,
        core.proc_class,
    ] {
        env.add_module_decl(module, origin, class_decl(Some("Object"), &[]));
    }
    env.add_module_decl(core.array, origin, class_decl(Some("Object"), &["Elem"]));
    env.add_module_decl(core.hash, origin, class_decl(Some("Object"), &["K", "V"]));

    let all = [
        core.basic_object,
        core.object,
        core.module,
        core.class,
        core.kernel,
        core.integer,
        core.float,
        core.string,
        core.symbol,
        core.nil,
        core.true_class,
        core.false_class,
        core.array,
        core.hash,
        core.proc_class,
    ];
    for module in all {
        let key = ConstKey::new(core.object, env.module_name(module));
        let vtx = env.add_const_def(&key, origin);
        let singleton = env.source(&[Type::Singleton(module)]);
        env.add_edge(singleton, vtx);
    }

    let hooks: [(MethodKey, Rc<dyn BuiltinMethod>); 5] = [
        (MethodKey::new(core.class, false, "new"), Rc::new(ClassNew)),
        (MethodKey::new(core.basic_object, false, "initialize"), Rc::new(DefaultInitialize)),
        (MethodKey::new(core.proc_class, false, "call"), Rc::new(ProcCall)),
        (MethodKey::new(core.array, false, "[]"), Rc::new(ArrayAref)),
        (MethodKey::new(core.array, false, "<<"), Rc::new(ArrayPush)),
    ];
    for (key, hook) in hooks {
        debug!(method = hook.name(), "registering builtin");
        env.ensure_method_entity(&key).builtin = Some(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_core_hierarchy() {
        let env = GlobalEnv::new(EngineConfig::default());
        let core = env.core();
        assert_eq!(env.module(core.integer).superclass(), Some(core.object));
        assert_eq!(env.module(core.object).superclass(), Some(core.basic_object));
        assert_eq!(env.module(core.basic_object).superclass(), None);
        assert_eq!(env.module(core.kernel).superclass(), None);
        assert!(env.module(core.object).included_modules().any(|m| m == core.kernel));
        assert_eq!(env.module(core.array).type_params(), &["Elem".to_string()]);
        assert_eq!(env.module(core.hash).type_params().len(), 2);
    }

    #[test]
    fn test_core_constants_hold_singletons() {
        let env = GlobalEnv::new(EngineConfig::default());
        let core = env.core().clone();
        let key = ConstKey::new(core.object, "String");
        let ce = env.const_entity(&key).unwrap();
        assert!(ce.exists());
        assert!(env.vertex(ce.vertex()).contains(&Type::Singleton(core.string)));
    }

    #[test]
    fn test_hooks_are_registered() {
        let env = GlobalEnv::new(EngineConfig::default());
        let core = env.core().clone();
        let me = env.method_entity(&MethodKey::new(core.class, false, "new")).unwrap();
        assert!(me.exists());
        assert_eq!(me.builtin.as_ref().map(|h| h.name()), Some("Class#new"));
    }
}
