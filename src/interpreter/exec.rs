use super::*;
use super::builtins::await_value;

/// Script evaluation: hoist, then run the statement list. The script's
/// completion value is the value of its last value-producing statement.
pub(crate) async fn script_evaluation(agent: &Agent, program: &Program, env: &EnvRef) -> Completion {
    hoist_declarations(agent, &program.body, env);
    match exec_statements(agent, &program.body, env).await {
        Completion::Normal(value) => Completion::Normal(value.unwrap_or(JsValue::Undefined)),
        Completion::Throw(error) => Completion::Throw(error),
        abrupt => internal_error!("{} completion escaped a script", abrupt.kind_name()),
    }
}

/// Body of a function whose declarations are already instantiated.
pub(crate) async fn function_body(
    agent: &Agent,
    body: &[Statement],
    env: &EnvRef,
) -> StatementCompletion {
    exec_statements(agent, body, env).await
}

/// Var-scoped names and top-level function declarations of a body.
pub(crate) fn hoist_declarations(agent: &Agent, body: &[Statement], env: &EnvRef) {
    for stmt in body {
        hoist_var_names(stmt, env);
    }
    instantiate_function_declarations(agent, body, env);
}

fn hoist_var_names(stmt: &Statement, env: &EnvRef) {
    match &stmt.kind {
        StatementKind::Variable {
            kind: VarKind::Var,
            name,
            ..
        } => env.borrow_mut().declare(name, BindingKind::Var),
        StatementKind::Block { body } => body.iter().for_each(|s| hoist_var_names(s, env)),
        StatementKind::If {
            consequent,
            alternate,
            ..
        } => {
            hoist_var_names(consequent, env);
            if let Some(alt) = alternate {
                hoist_var_names(alt, env);
            }
        }
        StatementKind::While { body, .. } | StatementKind::Labeled { body, .. } => {
            hoist_var_names(body, env)
        }
        StatementKind::Try {
            block,
            handler,
            finalizer,
        } => {
            block.iter().for_each(|s| hoist_var_names(s, env));
            if let Some(h) = handler {
                h.body.iter().for_each(|s| hoist_var_names(s, env));
            }
            if let Some(f) = finalizer {
                f.iter().for_each(|s| hoist_var_names(s, env));
            }
        }
        _ => {}
    }
}

fn instantiate_function_declarations(agent: &Agent, body: &[Statement], env: &EnvRef) {
    for stmt in body {
        if let StatementKind::FunctionDeclaration { function } = &stmt.kind {
            let func = agent.make_function(function, env);
            let name = function.name.as_deref().unwrap_or_default();
            env.borrow_mut().initialize(name, BindingKind::Var, func);
        }
    }
}

pub(crate) fn exec_statements<'a>(
    agent: &'a Agent,
    stmts: &'a [Statement],
    env: &'a EnvRef,
) -> LocalBoxFuture<'a, StatementCompletion> {
    Box::pin(async move {
        let mut last = None;
        for stmt in stmts {
            match exec_statement(agent, stmt, env, &[]).await {
                Completion::Normal(value) => {
                    if value.is_some() {
                        last = value;
                    }
                }
                abrupt => return abrupt.update_empty(last),
            }
        }
        Completion::Normal(last)
    })
}

/// `labels` is the label set of the enclosing labelled statements.
pub(crate) fn exec_statement<'a>(
    agent: &'a Agent,
    stmt: &'a Statement,
    env: &'a EnvRef,
    labels: &'a [String],
) -> LocalBoxFuture<'a, StatementCompletion> {
    Box::pin(exec_statement_inner(agent, stmt, env, labels))
}

async fn exec_statement_inner(
    agent: &Agent,
    stmt: &Statement,
    env: &EnvRef,
    labels: &[String],
) -> StatementCompletion {
    agent.before_statement(stmt).await;
    match &stmt.kind {
        StatementKind::Empty | StatementKind::FunctionDeclaration { .. } => Completion::Normal(None),
        StatementKind::Expression { expression } => {
            let value = q!(eval::eval_expression(agent, expression, env).await);
            Completion::Normal(Some(value))
        }
        StatementKind::Variable { kind, name, init } => {
            exec_variable(agent, *kind, name, init.as_ref(), env).await
        }
        StatementKind::Block { body } => {
            let block_env = Environment::new(Some(env.clone()));
            instantiate_function_declarations(agent, body, &block_env);
            exec_statements(agent, body, &block_env).await
        }
        StatementKind::If {
            test,
            consequent,
            alternate,
        } => {
            let cond = q!(eval::eval_expression(agent, test, env).await);
            let result = if to_boolean(&cond) {
                exec_statement(agent, consequent, env, &[]).await
            } else if let Some(alt) = alternate {
                exec_statement(agent, alt, env, &[]).await
            } else {
                Completion::Normal(None)
            };
            result.update_empty(Some(JsValue::Undefined))
        }
        StatementKind::While { test, body } => exec_while(agent, test, body, env, labels).await,
        StatementKind::Return { argument } => {
            let mut value = match argument {
                Some(expr) => q!(eval::eval_expression(agent, expr, env).await),
                None => JsValue::Undefined,
            };
            if argument.is_some() && agent.in_async_generator() {
                value = q!(await_value(agent, value).await);
            }
            Completion::Return(value)
        }
        StatementKind::Throw { argument } => {
            let value = q!(eval::eval_expression(agent, argument, env).await);
            Completion::Throw(value)
        }
        StatementKind::Try {
            block,
            handler,
            finalizer,
        } => exec_try(agent, block, handler.as_ref(), finalizer.as_deref(), env).await,
        StatementKind::Break { label } => Completion::Break(label.clone()),
        StatementKind::Continue { label } => Completion::Continue(label.clone()),
        StatementKind::Labeled { label, body } => {
            let mut label_set = labels.to_vec();
            label_set.push(label.clone());
            // §14.13.4 LabelledEvaluation
            match exec_statement(agent, body, env, &label_set).await {
                Completion::Break(Some(target)) if target == *label => {
                    Completion::Normal(None)
                }
                other => other,
            }
        }
        StatementKind::Debugger => {
            agent
                .checkpoint(stmt.kind_name(), stmt.loc, CheckpointPhase::DebuggerStatement)
                .await;
            Completion::Normal(None)
        }
    }
}

async fn exec_variable(
    agent: &Agent,
    kind: VarKind,
    name: &str,
    init: Option<&Expression>,
    env: &EnvRef,
) -> StatementCompletion {
    let value = match init {
        Some(expr) => Some(q!(eval::eval_expression(agent, expr, env).await)),
        None => None,
    };
    match kind {
        VarKind::Var => {
            if let Some(value) = value
                && env.borrow_mut().set(name, value).is_err()
            {
                return agent.throw_type_error("Assignment to constant variable.");
            }
        }
        VarKind::Let => env.borrow_mut().initialize(
            name,
            BindingKind::Let,
            value.unwrap_or(JsValue::Undefined),
        ),
        VarKind::Const => env.borrow_mut().initialize(
            name,
            BindingKind::Const,
            value.unwrap_or(JsValue::Undefined),
        ),
    }
    Completion::Normal(None)
}

// §14.7.1.1 LoopContinues
fn loop_continues(completion: &StatementCompletion, labels: &[String]) -> bool {
    match completion {
        Completion::Normal(_) => true,
        Completion::Continue(None) => true,
        Completion::Continue(Some(label)) => labels.contains(label),
        _ => false,
    }
}

// §14.7.3.2 WhileLoopEvaluation
async fn exec_while(
    agent: &Agent,
    test: &Expression,
    body: &Statement,
    env: &EnvRef,
    labels: &[String],
) -> StatementCompletion {
    let mut value = None;
    loop {
        let cond = q!(eval::eval_expression(agent, test, env).await);
        if !to_boolean(&cond) {
            return Completion::Normal(value);
        }
        let result = exec_statement(agent, body, env, &[]).await;
        if !loop_continues(&result, labels) {
            return match result.update_empty(value.clone()) {
                // an unlabelled break ends this loop
                Completion::Break(None) => Completion::Normal(value),
                other => other,
            };
        }
        if let Completion::Normal(Some(v)) = result {
            value = Some(v);
        }
    }
}

// §14.15.3 TryStatement evaluation
async fn exec_try(
    agent: &Agent,
    block: &[Statement],
    handler: Option<&CatchClause>,
    finalizer: Option<&[Statement]>,
    env: &EnvRef,
) -> StatementCompletion {
    let block_env = Environment::new(Some(env.clone()));
    instantiate_function_declarations(agent, block, &block_env);
    let mut result = exec_statements(agent, block, &block_env).await;

    if let (Completion::Throw(error), Some(handler)) = (&result, handler) {
        let catch_env = Environment::new(Some(env.clone()));
        if let Some(param) = &handler.param {
            catch_env
                .borrow_mut()
                .initialize(param, BindingKind::Let, error.clone());
        }
        instantiate_function_declarations(agent, &handler.body, &catch_env);
        result = exec_statements(agent, &handler.body, &catch_env).await;
    }

    if let Some(finalizer) = finalizer {
        let finally_env = Environment::new(Some(env.clone()));
        instantiate_function_declarations(agent, finalizer, &finally_env);
        let finally_result = exec_statements(agent, finalizer, &finally_env).await;
        if finally_result.is_abrupt() {
            result = finally_result;
        }
    }
    result.update_empty(Some(JsValue::Undefined))
}
