use super::builtins::{await_value, generator, iterator};
use super::call::{call, construct};
use super::*;

pub(crate) fn eval_expression<'a>(
    agent: &'a Agent,
    expr: &'a Expression,
    env: &'a EnvRef,
) -> LocalBoxFuture<'a, Completion> {
    Box::pin(eval_expression_inner(agent, expr, env))
}

async fn eval_expression_inner(agent: &Agent, expr: &Expression, env: &EnvRef) -> Completion {
    agent.before_expression(expr).await;
    match &expr.kind {
        ExpressionKind::Literal { value } => Completion::Normal(eval_literal(value)),
        ExpressionKind::Identifier { name } => resolve_binding(agent, name, env),
        ExpressionKind::This => Completion::Normal(env.borrow().get("this").unwrap_or(JsValue::Undefined)),
        ExpressionKind::Assign { target, value } => eval_assign(agent, target, value, env).await,
        ExpressionKind::Member { object, property } => {
            let base = q!(eval_expression(agent, object, env).await);
            agent.get_v(&base, property)
        }
        ExpressionKind::Call { callee, arguments } => {
            eval_call(agent, expr, callee, arguments, env).await
        }
        ExpressionKind::New { callee, arguments } => {
            let constructor = q!(eval_expression(agent, callee, env).await);
            let args = q!(eval_arguments(agent, arguments, env).await);
            construct(agent, constructor, args, None).await
        }
        ExpressionKind::Binary {
            operator,
            left,
            right,
        } => {
            let lval = q!(eval_expression(agent, left, env).await);
            let rval = q!(eval_expression(agent, right, env).await);
            Completion::Normal(eval_binary(*operator, &lval, &rval))
        }
        ExpressionKind::Logical {
            operator,
            left,
            right,
        } => {
            let lval = q!(eval_expression(agent, left, env).await);
            let short_circuit = match operator {
                LogicalOperator::And => !to_boolean(&lval),
                LogicalOperator::Or => to_boolean(&lval),
                LogicalOperator::Nullish => !lval.is_nullish(),
            };
            if short_circuit {
                Completion::Normal(lval)
            } else {
                eval_expression(agent, right, env).await
            }
        }
        ExpressionKind::Unary { operator, argument } => {
            eval_unary(agent, *operator, argument, env).await
        }
        ExpressionKind::Object { properties } => {
            let obj = agent.ordinary_object();
            for prop in properties {
                let value = q!(eval_expression(agent, &prop.value, env).await);
                q!(agent.create_data_property_or_throw(obj, &prop.key, value));
            }
            Completion::Normal(JsValue::Object(obj))
        }
        ExpressionKind::Function { function } => Completion::Normal(agent.make_function(function, env)),
        ExpressionKind::Yield {
            argument,
            delegate: false,
        } => {
            let value = match argument {
                Some(arg) => q!(eval_expression(agent, arg, env).await),
                None => JsValue::Undefined,
            };
            generator::yield_value(agent, value).await
        }
        ExpressionKind::Yield {
            argument,
            delegate: true,
        } => {
            let value = match argument {
                Some(arg) => q!(eval_expression(agent, arg, env).await),
                None => JsValue::Undefined,
            };
            iterator::yield_delegate(agent, value).await
        }
        ExpressionKind::Await { argument } => {
            let value = q!(eval_expression(agent, argument, env).await);
            await_value(agent, value).await
        }
    }
}

fn eval_literal(literal: &Literal) -> JsValue {
    match literal {
        Literal::Undefined => JsValue::Undefined,
        Literal::Null => JsValue::Null,
        Literal::Boolean { value } => JsValue::Boolean(*value),
        Literal::Number { value } => JsValue::Number(*value),
        Literal::String { value } => JsValue::string(value),
    }
}

// §9.4.2 ResolveBinding + GetValue
fn resolve_binding(agent: &Agent, name: &str, env: &EnvRef) -> Completion {
    let env = env.borrow();
    if let Some(value) = env.get(name) {
        return Completion::Normal(value);
    }
    if env.has(name) {
        return agent.throw_reference_error(&format!(
            "Cannot access '{name}' before initialization"
        ));
    }
    agent.throw_reference_error(&format!("{name} is not defined"))
}

async fn eval_assign(
    agent: &Agent,
    target: &AssignTarget,
    value: &Expression,
    env: &EnvRef,
) -> Completion {
    match target {
        AssignTarget::Identifier { name } => {
            let value = q!(eval_expression(agent, value, env).await);
            let result = env.borrow_mut().set(name, value.clone());
            match result {
                Ok(()) => Completion::Normal(value),
                Err(BindingError::Constant) => {
                    agent.throw_type_error("Assignment to constant variable.")
                }
                Err(BindingError::Uninitialized) => agent.throw_reference_error(&format!(
                    "Cannot access '{name}' before initialization"
                )),
            }
        }
        AssignTarget::Member { object, property } => {
            let base = q!(eval_expression(agent, object, env).await);
            let value = q!(eval_expression(agent, value, env).await);
            let Some(obj) = base.as_object() else {
                return agent.throw_type_error(&format!(
                    "Cannot set properties of {base} (setting '{property}')"
                ));
            };
            q!(agent.set(obj, property, value.clone()));
            Completion::Normal(value)
        }
    }
}

async fn eval_arguments(
    agent: &Agent,
    arguments: &[Expression],
    env: &EnvRef,
) -> Completion<Vec<JsValue>> {
    let mut values = Vec::with_capacity(arguments.len());
    for arg in arguments {
        values.push(q!(eval_expression(agent, arg, env).await));
    }
    Completion::Normal(values)
}

// §13.3.6.1 Function calls, plus the after-call checkpoint
async fn eval_call(
    agent: &Agent,
    expr: &Expression,
    callee: &Expression,
    arguments: &[Expression],
    env: &EnvRef,
) -> Completion {
    let (func, this) = match &callee.kind {
        ExpressionKind::Member { object, property } => {
            agent.before_expression(callee).await;
            let base = q!(eval_expression(agent, object, env).await);
            let func = q!(agent.get_v(&base, property));
            (func, base)
        }
        _ => (q!(eval_expression(agent, callee, env).await), JsValue::Undefined),
    };
    let args = q!(eval_arguments(agent, arguments, env).await);
    if !agent.is_callable(&func) {
        return agent.throw_type_error(&format!("{} is not a function", agent.describe(&func)));
    }
    let result = q!(call(agent, func, this, args).await);
    match agent
        .checkpoint(expr.kind_name(), expr.loc, CheckpointPhase::AfterCall)
        .await
    {
        Some(replacement) => Completion::Normal(replacement),
        None => Completion::Normal(result),
    }
}

fn eval_binary(operator: BinaryOperator, lval: &JsValue, rval: &JsValue) -> JsValue {
    match operator {
        BinaryOperator::Add => {
            if matches!(lval, JsValue::String(_)) || matches!(rval, JsValue::String(_)) {
                JsValue::String(to_js_string(lval).concat(&to_js_string(rval)))
            } else {
                JsValue::Number(to_number(lval) + to_number(rval))
            }
        }
        BinaryOperator::Sub => JsValue::Number(to_number(lval) - to_number(rval)),
        BinaryOperator::Mul => JsValue::Number(to_number(lval) * to_number(rval)),
        BinaryOperator::Less => JsValue::Boolean(less_than(lval, rval) == Some(true)),
        BinaryOperator::Greater => JsValue::Boolean(less_than(rval, lval) == Some(true)),
        BinaryOperator::LessEq => JsValue::Boolean(less_than(rval, lval) == Some(false)),
        BinaryOperator::GreaterEq => JsValue::Boolean(less_than(lval, rval) == Some(false)),
        BinaryOperator::StrictEq => JsValue::Boolean(strict_equality(lval, rval)),
        BinaryOperator::StrictNotEq => JsValue::Boolean(!strict_equality(lval, rval)),
    }
}

async fn eval_unary(
    agent: &Agent,
    operator: UnaryOperator,
    argument: &Expression,
    env: &EnvRef,
) -> Completion {
    // typeof on an unresolvable reference is "undefined", not a ReferenceError
    if operator == UnaryOperator::Typeof
        && let ExpressionKind::Identifier { name } = &argument.kind
        && !env.borrow().has(name)
    {
        return Completion::Normal(JsValue::string("undefined"));
    }
    let value = q!(eval_expression(agent, argument, env).await);
    Completion::Normal(match operator {
        UnaryOperator::Not => JsValue::Boolean(!to_boolean(&value)),
        UnaryOperator::Minus => JsValue::Number(-to_number(&value)),
        UnaryOperator::Typeof => JsValue::string(agent.typeof_val(&value)),
        UnaryOperator::Void => JsValue::Undefined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::build::call;

    fn run(body: Vec<Statement>) -> Completion {
        let agent = Agent::new(AgentOptions::default());
        match agent.evaluate_script(program(body)).unwrap() {
            Outcome::Completed(c) => c,
            Outcome::Paused(_) => panic!("unexpected pause"),
        }
    }

    fn string_result(c: Completion) -> String {
        match c {
            Completion::Normal(JsValue::String(s)) => s.to_rust_string(),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn addition_concatenates_with_strings() {
        let result = run(vec![expr_stmt(add(string("a"), add(num(1.0), num(2.0))))]);
        assert_eq!(string_result(result), "a3");
    }

    #[test]
    fn comparisons_with_nan_are_false() {
        let nan = binary(BinaryOperator::Mul, string("x"), num(1.0));
        let result = run(vec![expr_stmt(binary(BinaryOperator::LessEq, nan, num(1.0)))]);
        assert!(matches!(result, Completion::Normal(JsValue::Boolean(false))));
    }

    #[test]
    fn logical_operators_short_circuit() {
        // null ?? (undefined || "x")
        let result = run(vec![expr_stmt(logical(
            LogicalOperator::Nullish,
            null(),
            logical(LogicalOperator::Or, undefined(), string("x")),
        ))]);
        assert_eq!(string_result(result), "x");
        // false && missing() never evaluates the call
        let result = run(vec![expr_stmt(logical(
            LogicalOperator::And,
            boolean(false),
            call(ident("missing"), vec![]),
        ))]);
        assert!(matches!(result, Completion::Normal(JsValue::Boolean(false))));
    }

    #[test]
    fn unresolvable_reference_is_a_reference_error() {
        let agent = Agent::new(AgentOptions::default());
        let Outcome::Completed(Completion::Throw(err)) = agent
            .evaluate_script(program(vec![expr_stmt(ident("nope"))]))
            .unwrap()
        else {
            panic!("expected throw");
        };
        assert_eq!(agent.error_message(&err).as_deref(), Some("nope is not defined"));
        let name = agent.get_property(&err, "name");
        assert!(matches!(name, Completion::Normal(JsValue::String(ref s)) if s.to_rust_string() == "ReferenceError"));
    }

    #[test]
    fn typeof_tolerates_unresolvable_names() {
        let result = run(vec![expr_stmt(unary(UnaryOperator::Typeof, ident("nope")))]);
        assert_eq!(string_result(result), "undefined");
        let result = run(vec![expr_stmt(unary(
            UnaryOperator::Typeof,
            function(FunctionKind::Normal, &[], vec![]),
        ))]);
        assert_eq!(string_result(result), "function");
    }

    #[test]
    fn tdz_access_throws() {
        let result = run(vec![block(vec![
            expr_stmt(call(arrow(&[], vec![return_(Some(ident("later")))]), vec![])),
            let_("later", num(1.0)),
        ])]);
        // `later` is not declared until its let executes; the lookup misses entirely
        assert!(result.is_throw());
    }

    #[test]
    fn member_assignment_on_primitive_throws() {
        let result = run(vec![expr_stmt(assign_member(num(1.0), "x", num(2.0)))]);
        assert!(result.is_throw());
    }

    #[test]
    fn object_literals_and_member_access() {
        let result = run(vec![
            let_("o", object(vec![("a", num(1.0)), ("b", string("two"))])),
            expr_stmt(add(member(ident("o"), "a"), member(ident("o"), "b"))),
        ]);
        assert_eq!(string_result(result), "1two");
    }
}
