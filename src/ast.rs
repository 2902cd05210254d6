/// AST node types consumed by the evaluator.
/// The tree is produced by an external parser (or deserialized from JSON);
/// every node carries the source location used for debugger checkpoints.
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub loc: SourceLocation,
    pub kind: StatementKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatementKind {
    Empty,
    Expression {
        expression: Expression,
    },
    Variable {
        kind: VarKind,
        name: String,
        init: Option<Expression>,
    },
    FunctionDeclaration {
        function: Rc<FunctionNode>,
    },
    Block {
        body: Vec<Statement>,
    },
    If {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },
    While {
        test: Expression,
        body: Box<Statement>,
    },
    Return {
        argument: Option<Expression>,
    },
    Throw {
        argument: Expression,
    },
    Try {
        block: Vec<Statement>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Statement>>,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Labeled {
        label: String,
        body: Box<Statement>,
    },
    Debugger,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expression {
    #[serde(default)]
    pub loc: SourceLocation,
    pub kind: ExpressionKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExpressionKind {
    Literal {
        value: Literal,
    },
    Identifier {
        name: String,
    },
    This,
    Assign {
        target: AssignTarget,
        value: Box<Expression>,
    },
    Member {
        object: Box<Expression>,
        property: String,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    New {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        argument: Box<Expression>,
    },
    Object {
        properties: Vec<ObjectProperty>,
    },
    Function {
        function: Rc<FunctionNode>,
    },
    Yield {
        argument: Option<Box<Expression>>,
        delegate: bool,
    },
    Await {
        argument: Box<Expression>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Literal {
    Undefined,
    Null,
    Boolean { value: bool },
    Number { value: f64 },
    String { value: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssignTarget {
    Identifier {
        name: String,
    },
    Member {
        object: Box<Expression>,
        property: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub key: String,
    pub value: Expression,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    StrictEq,
    StrictNotEq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
    Nullish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    Typeof,
    Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FunctionKind {
    #[default]
    Normal,
    Generator,
    Async,
    AsyncGenerator,
}

impl FunctionKind {
    pub fn is_generator(self) -> bool {
        matches!(self, FunctionKind::Generator | FunctionKind::AsyncGenerator)
    }

    pub fn is_async(self) -> bool {
        matches!(self, FunctionKind::Async | FunctionKind::AsyncGenerator)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    #[serde(default)]
    pub kind: FunctionKind,
    #[serde(default)]
    pub is_arrow: bool,
    #[serde(default)]
    pub loc: SourceLocation,
}

impl Statement {
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            StatementKind::Empty => "EmptyStatement",
            StatementKind::Expression { .. } => "ExpressionStatement",
            StatementKind::Variable { .. } => "VariableDeclaration",
            StatementKind::FunctionDeclaration { .. } => "FunctionDeclaration",
            StatementKind::Block { .. } => "BlockStatement",
            StatementKind::If { .. } => "IfStatement",
            StatementKind::While { .. } => "WhileStatement",
            StatementKind::Return { .. } => "ReturnStatement",
            StatementKind::Throw { .. } => "ThrowStatement",
            StatementKind::Try { .. } => "TryStatement",
            StatementKind::Break { .. } => "BreakStatement",
            StatementKind::Continue { .. } => "ContinueStatement",
            StatementKind::Labeled { .. } => "LabeledStatement",
            StatementKind::Debugger => "DebuggerStatement",
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.loc = SourceLocation { line, column };
        self
    }
}

impl Expression {
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExpressionKind::Literal { .. } => "Literal",
            ExpressionKind::Identifier { .. } => "Identifier",
            ExpressionKind::This => "ThisExpression",
            ExpressionKind::Assign { .. } => "AssignmentExpression",
            ExpressionKind::Member { .. } => "MemberExpression",
            ExpressionKind::Call { .. } => "CallExpression",
            ExpressionKind::New { .. } => "NewExpression",
            ExpressionKind::Binary { .. } => "BinaryExpression",
            ExpressionKind::Logical { .. } => "LogicalExpression",
            ExpressionKind::Unary { .. } => "UnaryExpression",
            ExpressionKind::Object { .. } => "ObjectExpression",
            ExpressionKind::Function { .. } => "FunctionExpression",
            ExpressionKind::Yield { .. } => "YieldExpression",
            ExpressionKind::Await { .. } => "AwaitExpression",
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.loc = SourceLocation { line, column };
        self
    }
}

/// Constructors for building trees by hand.
pub mod build {
    use super::*;

    fn expr(kind: ExpressionKind) -> Expression {
        Expression {
            loc: SourceLocation::default(),
            kind,
        }
    }

    fn stmt(kind: StatementKind) -> Statement {
        Statement {
            loc: SourceLocation::default(),
            kind,
        }
    }

    pub fn program(body: Vec<Statement>) -> Program {
        Program { body }
    }

    pub fn undefined() -> Expression {
        expr(ExpressionKind::Literal {
            value: Literal::Undefined,
        })
    }

    pub fn null() -> Expression {
        expr(ExpressionKind::Literal {
            value: Literal::Null,
        })
    }

    pub fn boolean(value: bool) -> Expression {
        expr(ExpressionKind::Literal {
            value: Literal::Boolean { value },
        })
    }

    pub fn num(value: f64) -> Expression {
        expr(ExpressionKind::Literal {
            value: Literal::Number { value },
        })
    }

    pub fn string(value: &str) -> Expression {
        expr(ExpressionKind::Literal {
            value: Literal::String {
                value: value.to_string(),
            },
        })
    }

    pub fn ident(name: &str) -> Expression {
        expr(ExpressionKind::Identifier {
            name: name.to_string(),
        })
    }

    pub fn this() -> Expression {
        expr(ExpressionKind::This)
    }

    pub fn assign(name: &str, value: Expression) -> Expression {
        expr(ExpressionKind::Assign {
            target: AssignTarget::Identifier {
                name: name.to_string(),
            },
            value: Box::new(value),
        })
    }

    pub fn assign_member(object: Expression, property: &str, value: Expression) -> Expression {
        expr(ExpressionKind::Assign {
            target: AssignTarget::Member {
                object: Box::new(object),
                property: property.to_string(),
            },
            value: Box::new(value),
        })
    }

    pub fn member(object: Expression, property: &str) -> Expression {
        expr(ExpressionKind::Member {
            object: Box::new(object),
            property: property.to_string(),
        })
    }

    pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
        expr(ExpressionKind::Call {
            callee: Box::new(callee),
            arguments,
        })
    }

    pub fn method_call(object: Expression, method: &str, arguments: Vec<Expression>) -> Expression {
        call(member(object, method), arguments)
    }

    pub fn new(callee: Expression, arguments: Vec<Expression>) -> Expression {
        expr(ExpressionKind::New {
            callee: Box::new(callee),
            arguments,
        })
    }

    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
        expr(ExpressionKind::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn add(left: Expression, right: Expression) -> Expression {
        binary(BinaryOperator::Add, left, right)
    }

    pub fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
        expr(ExpressionKind::Logical {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(operator: UnaryOperator, argument: Expression) -> Expression {
        expr(ExpressionKind::Unary {
            operator,
            argument: Box::new(argument),
        })
    }

    pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
        expr(ExpressionKind::Object {
            properties: properties
                .into_iter()
                .map(|(key, value)| ObjectProperty {
                    key: key.to_string(),
                    value,
                })
                .collect(),
        })
    }

    pub fn function_node(
        kind: FunctionKind,
        name: Option<&str>,
        params: &[&str],
        body: Vec<Statement>,
    ) -> Rc<FunctionNode> {
        Rc::new(FunctionNode {
            name: name.map(str::to_string),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
            kind,
            is_arrow: false,
            loc: SourceLocation::default(),
        })
    }

    pub fn function(kind: FunctionKind, params: &[&str], body: Vec<Statement>) -> Expression {
        expr(ExpressionKind::Function {
            function: function_node(kind, None, params, body),
        })
    }

    pub fn arrow(params: &[&str], body: Vec<Statement>) -> Expression {
        arrow_node(FunctionKind::Normal, params, body)
    }

    pub fn async_arrow(params: &[&str], body: Vec<Statement>) -> Expression {
        arrow_node(FunctionKind::Async, params, body)
    }

    fn arrow_node(kind: FunctionKind, params: &[&str], body: Vec<Statement>) -> Expression {
        expr(ExpressionKind::Function {
            function: Rc::new(FunctionNode {
                name: None,
                params: params.iter().map(|p| p.to_string()).collect(),
                body,
                kind,
                is_arrow: true,
                loc: SourceLocation::default(),
            }),
        })
    }

    pub fn yield_(argument: Expression) -> Expression {
        expr(ExpressionKind::Yield {
            argument: Some(Box::new(argument)),
            delegate: false,
        })
    }

    pub fn yield_empty() -> Expression {
        expr(ExpressionKind::Yield {
            argument: None,
            delegate: false,
        })
    }

    pub fn yield_star(argument: Expression) -> Expression {
        expr(ExpressionKind::Yield {
            argument: Some(Box::new(argument)),
            delegate: true,
        })
    }

    pub fn await_(argument: Expression) -> Expression {
        expr(ExpressionKind::Await {
            argument: Box::new(argument),
        })
    }

    pub fn expr_stmt(expression: Expression) -> Statement {
        stmt(StatementKind::Expression { expression })
    }

    pub fn var(kind: VarKind, name: &str, init: Option<Expression>) -> Statement {
        stmt(StatementKind::Variable {
            kind,
            name: name.to_string(),
            init,
        })
    }

    pub fn let_(name: &str, init: Expression) -> Statement {
        var(VarKind::Let, name, Some(init))
    }

    pub fn const_(name: &str, init: Expression) -> Statement {
        var(VarKind::Const, name, Some(init))
    }

    pub fn function_decl(
        kind: FunctionKind,
        name: &str,
        params: &[&str],
        body: Vec<Statement>,
    ) -> Statement {
        stmt(StatementKind::FunctionDeclaration {
            function: function_node(kind, Some(name), params, body),
        })
    }

    pub fn block(body: Vec<Statement>) -> Statement {
        stmt(StatementKind::Block { body })
    }

    pub fn if_(test: Expression, consequent: Statement, alternate: Option<Statement>) -> Statement {
        stmt(StatementKind::If {
            test,
            consequent: Box::new(consequent),
            alternate: alternate.map(Box::new),
        })
    }

    pub fn while_(test: Expression, body: Statement) -> Statement {
        stmt(StatementKind::While {
            test,
            body: Box::new(body),
        })
    }

    pub fn return_(argument: Option<Expression>) -> Statement {
        stmt(StatementKind::Return { argument })
    }

    pub fn throw(argument: Expression) -> Statement {
        stmt(StatementKind::Throw { argument })
    }

    pub fn try_(
        block: Vec<Statement>,
        handler: Option<(Option<&str>, Vec<Statement>)>,
        finalizer: Option<Vec<Statement>>,
    ) -> Statement {
        stmt(StatementKind::Try {
            block,
            handler: handler.map(|(param, body)| CatchClause {
                param: param.map(str::to_string),
                body,
            }),
            finalizer,
        })
    }

    pub fn break_(label: Option<&str>) -> Statement {
        stmt(StatementKind::Break {
            label: label.map(str::to_string),
        })
    }

    pub fn continue_(label: Option<&str>) -> Statement {
        stmt(StatementKind::Continue {
            label: label.map(str::to_string),
        })
    }

    pub fn labeled(label: &str, body: Statement) -> Statement {
        stmt(StatementKind::Labeled {
            label: label.to_string(),
            body: Box::new(body),
        })
    }

    pub fn debugger() -> Statement {
        stmt(StatementKind::Debugger)
    }

    pub fn empty() -> Statement {
        stmt(StatementKind::Empty)
    }
}
