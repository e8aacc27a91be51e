use crate::env::GlobalEnv;
use crate::graph::{Changes, Type, VertexId};

/// `wrong number of arguments (2 for 3)`, with `...n` for an optional
/// upper bound and `+` when there is none
pub(crate) fn arity_message(actual: usize, lower: usize, upper: Option<usize>) -> String {
    let range = match upper {
        Some(upper) if upper > lower => format!("...{upper}"),
        Some(_) => String::new(),
        None => "+".to_string(),
    };
    format!("wrong number of arguments ({actual} for {lower}{range})")
}

/// Vertices for the actual arguments in `start..end`. A splatted array
/// contributes its element vertex; any other splatted value contributes
/// itself.
pub(crate) fn get_rest_args(
    env: &mut GlobalEnv,
    changes: &mut Changes,
    start: usize,
    end: usize,
    args: &[VertexId],
    splats: &[bool],
) -> Vec<VertexId> {
    let mut out = Vec::new();
    for i in start..end.min(args.len()) {
        let arg = args[i];
        if !splats.get(i).copied().unwrap_or(false) {
            out.push(arg);
            continue;
        }
        let types: Vec<Type> = env.vertex(arg).types().cloned().collect();
        for ty in types {
            match env.base_type(&ty) {
                Some(Type::Instance { module, args: targs }) if module == env.core().array => {
                    match targs.first() {
                        Some(&elem) => out.push(elem),
                        None => out.push(env.empty_vertex()),
                    }
                }
                _ => out.push(changes.type_source(env, "splat", ty)),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_arity_messages() {
        assert_eq!(arity_message(2, 3, Some(3)), "wrong number of arguments (2 for 3)");
        assert_eq!(arity_message(0, 1, Some(2)), "wrong number of arguments (0 for 1...2)");
        assert_eq!(arity_message(0, 1, None), "wrong number of arguments (0 for 1+)");
    }

    #[test]
    fn test_splatted_array_contributes_element() {
        let mut env = GlobalEnv::new(EngineConfig::default());
        let mut changes = Changes::default();
        let core = env.core().clone();
        let elem = env.source(&[Type::instance(core.integer)]);
        let ary = env.new_source(
            [Type::Array {
                elems: None,
                elem,
            }],
            None,
        );
        let plain = env.source(&[Type::instance(core.string)]);

        let rest = get_rest_args(&mut env, &mut changes, 0, 2, &[plain, ary], &[false, true]);
        assert_eq!(rest, vec![plain, elem]);
    }
}
