//! Turns a parse tree into a [`Program`], resolving names against the
//! [`Environment`] and allocating fresh relations for every derived entity.
//!
//! Method, function and command dispatch go through static descriptor tables.
//! Argument kinds are inferred from the parse tree and checked before any
//! argument is resolved, so a type error never allocates.

use smallvec::SmallVec;

use crate::entities::{Graph, GraphMetadata};
use crate::environment::{BASE_VARIABLE, Environment};
use crate::error::{Position, QueryError, ResolutionError};
use crate::instruction::{Direction, EdgeEndpoint, Instruction, MetadataScope};
use crate::program::Program;
use crate::query::{AssignOp, ExprKind, Expression, ParseTree, Statement, Variable};
use crate::response::ExportFormat;
use crate::types::{TypedValue, ValueKind};

type Args = SmallVec<[TypedValue; 4]>;

/// Resolve every statement in order. Bindings reach the symbol table only
/// when every statement resolves; a failure leaves just spent allocations.
pub fn resolve(tree: &ParseTree, env: &mut Environment<'_>) -> Result<Program, QueryError> {
    let mut resolver = Resolver {
        env,
        instructions: Vec::new(),
    };
    for statement in &tree.statements {
        if let Err(err) = resolver.statement(statement) {
            resolver.env.discard()?;
            return Err(err);
        }
    }
    resolver.env.commit()?;
    Ok(Program::new(resolver.instructions))
}

pub struct Resolver<'r, 'b> {
    env: &'r mut Environment<'b>,
    instructions: Vec<Instruction>,
}

/// Resolved arguments handed to a descriptor's builder.
struct Call<'a> {
    name: &'a str,
    position: Position,
    subject: Option<Graph>,
    keywords: SmallVec<[&'a str; 2]>,
    args: Args,
}

impl Call<'_> {
    fn subject(&self) -> Result<Graph, QueryError> {
        self.subject.clone().ok_or_else(|| {
            ResolutionError::UnknownOperation {
                name: self.name.to_string(),
                subject: "function".to_string(),
                position: self.position,
            }
            .into()
        })
    }

    fn arg(&self, index: usize) -> Result<&TypedValue, QueryError> {
        self.args.get(index).ok_or_else(|| {
            ResolutionError::Arity {
                name: self.name.to_string(),
                expected: (index + 1).to_string(),
                found: self.args.len(),
                position: self.position,
            }
            .into()
        })
    }

    fn mismatch(&self, index: usize, expected: ValueKind, found: ValueKind) -> QueryError {
        ResolutionError::TypeMismatch {
            context: format!("argument {} of `{}`", index + 1, self.name),
            expected: expected.to_string(),
            found,
            position: self.position,
        }
        .into()
    }

    fn graph(&self, index: usize) -> Result<Graph, QueryError> {
        let value = self.arg(index)?;
        value
            .as_graph()
            .cloned()
            .ok_or_else(|| self.mismatch(index, ValueKind::Graph, value.kind()))
    }

    fn integer(&self, index: usize) -> Result<i64, QueryError> {
        let value = self.arg(index)?;
        value
            .as_integer()
            .ok_or_else(|| self.mismatch(index, ValueKind::Integer, value.kind()))
    }

    fn non_negative(&self, index: usize, what: &str) -> Result<i64, QueryError> {
        let n = self.integer(index)?;
        if n < 0 {
            return Err(ResolutionError::InvalidArgument {
                message: format!("{what} of `{}` must be non-negative, got {n}", self.name),
                position: self.position,
            }
            .into());
        }
        Ok(n)
    }

    fn string(&self, index: usize) -> Result<&str, QueryError> {
        let value = self.arg(index)?;
        value
            .as_str()
            .ok_or_else(|| self.mismatch(index, ValueKind::String, value.kind()))
    }

    fn integers(&self) -> Result<Vec<i64>, QueryError> {
        (0..self.args.len()).map(|i| self.integer(i)).collect()
    }

    fn strings(&self) -> Result<Vec<String>, QueryError> {
        (0..self.args.len())
            .map(|i| self.string(i).map(str::to_string))
            .collect()
    }

    fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.contains(&keyword)
    }
}

type OperationBuilder = fn(&mut Resolver<'_, '_>, &Call<'_>) -> Result<TypedValue, QueryError>;

/// Method (`receiver` set) or free function.
struct OperationDescriptor {
    name: &'static str,
    receiver: Option<ValueKind>,
    params: &'static [ValueKind],
    /// The last parameter repeats; at least `params.len()` arguments are required.
    variadic: bool,
    returns: ValueKind,
    build: OperationBuilder,
}

const G: ValueKind = ValueKind::Graph;
const I: ValueKind = ValueKind::Integer;
const S: ValueKind = ValueKind::String;
const M: ValueKind = ValueKind::GraphMetadata;

const OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor {
        name: "vertices",
        receiver: None,
        params: &[I],
        variadic: true,
        returns: G,
        build: build_literal_vertices,
    },
    OperationDescriptor {
        name: "edges",
        receiver: None,
        params: &[I],
        variadic: true,
        returns: G,
        build: build_literal_edges,
    },
    OperationDescriptor {
        name: "getLineage",
        receiver: Some(G),
        params: &[G, I, S],
        variadic: false,
        returns: G,
        build: build_lineage,
    },
    OperationDescriptor {
        name: "getPath",
        receiver: Some(G),
        params: &[G, G, I],
        variadic: false,
        returns: G,
        build: build_path,
    },
    OperationDescriptor {
        name: "getShortestPath",
        receiver: Some(G),
        params: &[G, G, I],
        variadic: false,
        returns: G,
        build: build_shortest_path,
    },
    OperationDescriptor {
        name: "getSubgraph",
        receiver: Some(G),
        params: &[G],
        variadic: false,
        returns: G,
        build: build_subgraph,
    },
    OperationDescriptor {
        name: "getEdgeSource",
        receiver: Some(G),
        params: &[],
        variadic: false,
        returns: G,
        build: build_edge_source,
    },
    OperationDescriptor {
        name: "getEdgeDestination",
        receiver: Some(G),
        params: &[],
        variadic: false,
        returns: G,
        build: build_edge_destination,
    },
    OperationDescriptor {
        name: "getEdgeEndpoints",
        receiver: Some(G),
        params: &[],
        variadic: false,
        returns: G,
        build: build_edge_endpoints,
    },
    OperationDescriptor {
        name: "collapseEdge",
        receiver: Some(G),
        params: &[S],
        variadic: true,
        returns: G,
        build: build_collapse_edge,
    },
    OperationDescriptor {
        name: "limit",
        receiver: Some(G),
        params: &[I],
        variadic: false,
        returns: G,
        build: build_limit,
    },
    OperationDescriptor {
        name: "distinct",
        receiver: Some(G),
        params: &[],
        variadic: false,
        returns: G,
        build: build_distinct,
    },
    OperationDescriptor {
        name: "setVertexMetadata",
        receiver: Some(G),
        params: &[S, S],
        variadic: false,
        returns: M,
        build: build_vertex_metadata,
    },
    OperationDescriptor {
        name: "setEdgeMetadata",
        receiver: Some(G),
        params: &[S, S],
        variadic: false,
        returns: M,
        build: build_edge_metadata,
    },
    OperationDescriptor {
        name: "setMetadata",
        receiver: Some(G),
        params: &[S, S],
        variadic: false,
        returns: M,
        build: build_metadata,
    },
];

type CommandBuilder = fn(&mut Resolver<'_, '_>, &Call<'_>) -> Result<(), QueryError>;

struct CommandDescriptor {
    name: &'static str,
    /// Bare names accepted before the positional arguments.
    keywords: &'static [&'static str],
    required_keyword: Option<&'static str>,
    params: &'static [ValueKind],
    build: CommandBuilder,
}

const COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        name: "dump",
        keywords: &["force"],
        required_keyword: None,
        params: &[G],
        build: build_dump,
    },
    CommandDescriptor {
        name: "export",
        keywords: &["force"],
        required_keyword: None,
        params: &[G, S],
        build: build_export,
    },
    CommandDescriptor {
        name: "stat",
        keywords: &[],
        required_keyword: None,
        params: &[G],
        build: build_stat,
    },
    CommandDescriptor {
        name: "native",
        keywords: &[],
        required_keyword: None,
        params: &[S],
        build: build_native,
    },
    CommandDescriptor {
        name: "reset",
        keywords: &["environment"],
        required_keyword: Some("environment"),
        params: &[],
        build: build_reset,
    },
];

fn is_infix(operator: &str) -> bool {
    matches!(operator, "+" | "-" | "&")
}

fn find_operation(
    name: &str,
    has_subject: bool,
    position: Position,
) -> Result<&'static OperationDescriptor, QueryError> {
    OPERATIONS
        .iter()
        .find(|op| op.name == name && op.receiver.is_some() == has_subject)
        .ok_or_else(|| {
            ResolutionError::UnknownOperation {
                name: name.to_string(),
                subject: if has_subject { "Graph" } else { "function" }.to_string(),
                position,
            }
            .into()
        })
}

/// Kinds an infix operator accepts; both operands must share one of them.
fn check_binary(
    operator: &str,
    lhs: ValueKind,
    rhs: ValueKind,
    position: Position,
) -> Result<(), QueryError> {
    let accepted: &[ValueKind] = match operator {
        "+" => &[ValueKind::Graph, ValueKind::GraphMetadata],
        _ => &[ValueKind::Graph],
    };
    if !accepted.contains(&lhs) {
        let expected = accepted
            .iter()
            .map(|k| k.as_atom())
            .collect::<Vec<_>>()
            .join(" or ");
        return Err(ResolutionError::TypeMismatch {
            context: format!("left operand of `{operator}`"),
            expected,
            found: lhs,
            position,
        }
        .into());
    }
    if rhs != lhs {
        return Err(ResolutionError::TypeMismatch {
            context: format!("right operand of `{operator}`"),
            expected: lhs.to_string(),
            found: rhs,
            position,
        }
        .into());
    }
    Ok(())
}

impl Resolver<'_, '_> {
    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn fresh_graph(&mut self) -> Result<Graph, QueryError> {
        let target = self.env.allocate_graph()?;
        self.push(Instruction::CreateEmptyGraph {
            target: target.clone(),
        });
        Ok(target)
    }

    fn fresh_metadata(&mut self) -> Result<GraphMetadata, QueryError> {
        let target = self.env.allocate_graph_metadata()?;
        self.push(Instruction::CreateEmptyGraphMetadata {
            target: target.clone(),
        });
        Ok(target)
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), QueryError> {
        match statement {
            Statement::Assignment {
                position,
                target,
                operator,
                value,
            } => self.assignment(*position, target, *operator, value),
            Statement::Command {
                position,
                name,
                arguments,
            } => self.command(*position, name, arguments),
        }
    }

    fn assignment(
        &mut self,
        position: Position,
        target: &Variable,
        operator: AssignOp,
        value: &Expression,
    ) -> Result<(), QueryError> {
        if target.name == BASE_VARIABLE {
            return Err(ResolutionError::ReservedVariable {
                name: target.name.clone(),
            }
            .into());
        }

        let value_kind = self.infer_kind(value)?;
        let result = match operator.binary_operator() {
            None => {
                if value_kind != target.kind {
                    return Err(ResolutionError::TypeMismatch {
                        context: format!("assignment to `{target}`"),
                        expected: target.kind.to_string(),
                        found: value_kind,
                        position: value.position,
                    }
                    .into());
                }
                self.expression(value)?
            }
            Some(op) => {
                let current = self.variable(target, position)?;
                check_binary(op, target.kind, value_kind, position)?;
                let rhs = self.expression(value)?;
                self.binary(op, current, rhs)?
            }
        };
        self.env.set_value(&target.name, &result.to_string())
    }

    fn command(
        &mut self,
        position: Position,
        name: &str,
        arguments: &[Expression],
    ) -> Result<(), QueryError> {
        let descriptor = COMMANDS
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ResolutionError::UnknownCommand {
                name: name.to_string(),
                position,
            })?;

        let mut keywords = SmallVec::<[&str; 2]>::new();
        let mut rest = arguments;
        while let Some((first, tail)) = rest.split_first() {
            let Some(word) = first.as_name() else {
                break;
            };
            if !descriptor.keywords.contains(&word) {
                return Err(ResolutionError::InvalidArgument {
                    message: format!("`{name}` does not accept keyword `{word}`"),
                    position: first.position,
                }
                .into());
            }
            keywords.push(word);
            rest = tail;
        }

        if let Some(required) = descriptor.required_keyword {
            if !keywords.contains(&required) {
                let found = keywords
                    .iter()
                    .map(|k| k.to_string())
                    .chain(rest.iter().map(|e| describe_argument(self, e)))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ResolutionError::Signature {
                    name: name.to_string(),
                    found,
                    position,
                }
                .into());
            }
        }

        if rest.len() != descriptor.params.len() {
            return Err(ResolutionError::Arity {
                name: name.to_string(),
                expected: descriptor.params.len().to_string(),
                found: rest.len(),
                position,
            }
            .into());
        }
        self.check_arguments(name, rest, descriptor.params)?;

        let args = self.arguments(rest)?;
        let call = Call {
            name,
            position,
            subject: None,
            keywords,
            args,
        };
        (descriptor.build)(self, &call)
    }

    fn check_arguments(
        &self,
        name: &str,
        arguments: &[Expression],
        params: &[ValueKind],
    ) -> Result<(), QueryError> {
        for (index, argument) in arguments.iter().enumerate() {
            let Some(expected) = params.get(index).or(params.last()) else {
                break;
            };
            let found = self.infer_kind(argument)?;
            if found != *expected {
                return Err(ResolutionError::TypeMismatch {
                    context: format!("argument {} of `{name}`", index + 1),
                    expected: expected.to_string(),
                    found,
                    position: argument.position,
                }
                .into());
            }
        }
        Ok(())
    }

    fn arguments(&mut self, arguments: &[Expression]) -> Result<Args, QueryError> {
        let mut args = Args::new();
        for argument in arguments {
            args.push(self.expression(argument)?);
        }
        Ok(args)
    }

    /// Static kind of an expression, without resolving or allocating anything.
    fn infer_kind(&self, expr: &Expression) -> Result<ValueKind, QueryError> {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(value.kind()),
            ExprKind::Variable(variable) => Ok(variable.kind),
            ExprKind::Name(name) => Err(unexpected_name(name, expr.position)),
            ExprKind::Operation {
                subject,
                operator,
                operands,
            } => match subject {
                Some(subject) if is_infix(operator) => {
                    let lhs = self.infer_kind(subject)?;
                    if let Some(rhs) = operands.first() {
                        check_binary(operator, lhs, self.infer_kind(rhs)?, expr.position)?;
                    }
                    Ok(lhs)
                }
                _ => Ok(find_operation(operator, subject.is_some(), expr.position)?.returns),
            },
        }
    }

    fn variable(&self, variable: &Variable, position: Position) -> Result<TypedValue, QueryError> {
        let relation =
            self.env
                .lookup(&variable.name)
                .ok_or_else(|| ResolutionError::UnknownVariable {
                    name: variable.name.clone(),
                    position,
                })?;
        Ok(match variable.kind {
            ValueKind::GraphMetadata => TypedValue::GraphMetadata(GraphMetadata::new(relation)),
            _ => TypedValue::Graph(Graph::new(relation)),
        })
    }

    fn expression(&mut self, expr: &Expression) -> Result<TypedValue, QueryError> {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(value.clone()),
            ExprKind::Variable(variable) => self.variable(variable, expr.position),
            ExprKind::Name(name) => Err(unexpected_name(name, expr.position)),
            ExprKind::Operation {
                subject,
                operator,
                operands,
            } => match subject {
                Some(subject) if is_infix(operator) => {
                    self.infer_kind(expr)?;
                    let lhs = self.expression(subject)?;
                    let rhs = match operands.first() {
                        Some(rhs) => self.expression(rhs)?,
                        None => {
                            return Err(ResolutionError::Arity {
                                name: operator.clone(),
                                expected: "1".to_string(),
                                found: 0,
                                position: expr.position,
                            }
                            .into());
                        }
                    };
                    self.binary(operator, lhs, rhs)
                }
                _ => self.operation(
                    expr.position,
                    subject.as_deref(),
                    operator,
                    operands,
                ),
            },
        }
    }

    fn binary(
        &mut self,
        operator: &str,
        lhs: TypedValue,
        rhs: TypedValue,
    ) -> Result<TypedValue, QueryError> {
        match (operator, lhs, rhs) {
            ("+", TypedValue::Graph(a), TypedValue::Graph(b)) => {
                let target = self.fresh_graph()?;
                self.push(Instruction::UnionGraph {
                    target: target.clone(),
                    source: a,
                });
                self.push(Instruction::UnionGraph {
                    target: target.clone(),
                    source: b,
                });
                Ok(TypedValue::Graph(target))
            }
            ("+", TypedValue::GraphMetadata(a), TypedValue::GraphMetadata(b)) => {
                let target = self.fresh_metadata()?;
                self.push(Instruction::OverwriteGraphMetadata {
                    target: target.clone(),
                    lhs: a,
                    rhs: b,
                });
                Ok(TypedValue::GraphMetadata(target))
            }
            ("&", TypedValue::Graph(a), TypedValue::Graph(b)) => {
                let target = self.fresh_graph()?;
                self.push(Instruction::IntersectGraph {
                    target: target.clone(),
                    lhs: a,
                    rhs: b,
                });
                Ok(TypedValue::Graph(target))
            }
            ("-", TypedValue::Graph(a), TypedValue::Graph(b)) => {
                let target = self.fresh_graph()?;
                self.push(Instruction::SubtractGraph {
                    target: target.clone(),
                    minuend: a,
                    subtrahend: b,
                });
                Ok(TypedValue::Graph(target))
            }
            (operator, lhs, rhs) => {
                check_binary(operator, lhs.kind(), rhs.kind(), Position::default())?;
                Err(ResolutionError::UnknownOperation {
                    name: operator.to_string(),
                    subject: lhs.kind().to_string(),
                    position: Position::default(),
                }
                .into())
            }
        }
    }

    fn operation(
        &mut self,
        position: Position,
        subject: Option<&Expression>,
        name: &str,
        operands: &[Expression],
    ) -> Result<TypedValue, QueryError> {
        let descriptor = find_operation(name, subject.is_some(), position)?;

        let arity_ok = if descriptor.variadic {
            operands.len() >= descriptor.params.len()
        } else {
            operands.len() == descriptor.params.len()
        };
        if !arity_ok {
            let expected = if descriptor.variadic {
                format!("at least {}", descriptor.params.len())
            } else {
                descriptor.params.len().to_string()
            };
            return Err(ResolutionError::Arity {
                name: name.to_string(),
                expected,
                found: operands.len(),
                position,
            }
            .into());
        }

        if let (Some(subject), Some(receiver)) = (subject, descriptor.receiver) {
            let found = self.infer_kind(subject)?;
            if found != receiver {
                return Err(ResolutionError::TypeMismatch {
                    context: format!("receiver of `{name}`"),
                    expected: receiver.to_string(),
                    found,
                    position: subject.position,
                }
                .into());
            }
        }
        self.check_arguments(name, operands, descriptor.params)?;

        let subject = match subject {
            Some(subject) => self.expression(subject)?.as_graph().cloned(),
            None => None,
        };
        let args = self.arguments(operands)?;
        let call = Call {
            name,
            position,
            subject,
            keywords: SmallVec::new(),
            args,
        };
        (descriptor.build)(self, &call)
    }
}

fn unexpected_name(name: &str, position: Position) -> QueryError {
    ResolutionError::InvalidArgument {
        message: format!("unexpected name `{name}`"),
        position,
    }
    .into()
}

fn describe_argument(resolver: &Resolver<'_, '_>, expr: &Expression) -> String {
    match (&expr.kind, resolver.infer_kind(expr)) {
        (ExprKind::Name(name), _) => name.clone(),
        (_, Ok(kind)) => kind.to_string(),
        (_, Err(_)) => "?".to_string(),
    }
}

fn build_literal_vertices(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let ids = call.integers()?;
    let target = r.fresh_graph()?;
    r.push(Instruction::InsertLiteralVertex {
        target: target.clone(),
        ids,
    });
    Ok(TypedValue::Graph(target))
}

fn build_literal_edges(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let ids = call.integers()?;
    let target = r.fresh_graph()?;
    r.push(Instruction::InsertLiteralEdge {
        target: target.clone(),
        ids,
    });
    Ok(TypedValue::Graph(target))
}

fn build_lineage(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let subject = call.subject()?;
    let start = call.graph(0)?;
    let depth = call.non_negative(1, "depth")?;
    let raw_direction = call.string(2)?;
    let direction =
        Direction::parse(raw_direction).ok_or_else(|| ResolutionError::InvalidArgument {
            message: format!("unknown lineage direction `{raw_direction}`"),
            position: call.position,
        })?;
    let target = r.fresh_graph()?;
    r.push(Instruction::GetLineage {
        target: target.clone(),
        subject,
        start,
        depth,
        direction,
    });
    Ok(TypedValue::Graph(target))
}

fn build_path(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let subject = call.subject()?;
    let source = call.graph(0)?;
    let destination = call.graph(1)?;
    let max_depth = call.non_negative(2, "maximum depth")?;
    let target = r.fresh_graph()?;
    r.push(Instruction::GetPath {
        target: target.clone(),
        subject,
        source,
        destination,
        max_depth,
    });
    Ok(TypedValue::Graph(target))
}

fn build_shortest_path(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let subject = call.subject()?;
    let source = call.graph(0)?;
    let destination = call.graph(1)?;
    let max_depth = call.non_negative(2, "maximum depth")?;
    let target = r.fresh_graph()?;
    r.push(Instruction::GetShortestPath {
        target: target.clone(),
        subject,
        source,
        destination,
        max_depth,
    });
    Ok(TypedValue::Graph(target))
}

fn build_subgraph(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let subject = call.subject()?;
    let skeleton = call.graph(0)?;
    let target = r.fresh_graph()?;
    r.push(Instruction::GetSubgraph {
        target: target.clone(),
        subject,
        skeleton,
    });
    Ok(TypedValue::Graph(target))
}

fn endpoint_graph(
    r: &mut Resolver<'_, '_>,
    call: &Call<'_>,
    endpoint: EdgeEndpoint,
) -> Result<TypedValue, QueryError> {
    let subject = call.subject()?;
    let target = r.fresh_graph()?;
    r.push(Instruction::GetEdgeEndpoint {
        target: target.clone(),
        subject,
        endpoint,
    });
    Ok(TypedValue::Graph(target))
}

fn build_edge_source(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    endpoint_graph(r, call, EdgeEndpoint::Source)
}

fn build_edge_destination(
    r: &mut Resolver<'_, '_>,
    call: &Call<'_>,
) -> Result<TypedValue, QueryError> {
    endpoint_graph(r, call, EdgeEndpoint::Destination)
}

fn build_edge_endpoints(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    endpoint_graph(r, call, EdgeEndpoint::Both)
}

fn build_collapse_edge(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let source = call.subject()?;
    let fields = call.strings()?;
    let target = r.fresh_graph()?;
    r.push(Instruction::CollapseEdge {
        target: target.clone(),
        source,
        fields,
    });
    Ok(TypedValue::Graph(target))
}

fn build_limit(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let source = call.subject()?;
    let limit = call.non_negative(0, "limit")?;
    let target = r.fresh_graph()?;
    r.push(Instruction::LimitGraph {
        target: target.clone(),
        source,
        limit,
    });
    Ok(TypedValue::Graph(target))
}

fn build_distinct(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    let source = call.subject()?;
    let target = r.fresh_graph()?;
    r.push(Instruction::DistinctifyGraph {
        target: target.clone(),
        source,
    });
    Ok(TypedValue::Graph(target))
}

fn metadata_graph(
    r: &mut Resolver<'_, '_>,
    call: &Call<'_>,
    scope: MetadataScope,
) -> Result<TypedValue, QueryError> {
    let source = call.subject()?;
    let name = call.string(0)?.to_string();
    let value = call.string(1)?.to_string();
    let target = r.fresh_metadata()?;
    r.push(Instruction::SetGraphMetadata {
        target: target.clone(),
        scope,
        source,
        name,
        value,
    });
    Ok(TypedValue::GraphMetadata(target))
}

fn build_vertex_metadata(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    metadata_graph(r, call, MetadataScope::Vertex)
}

fn build_edge_metadata(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    metadata_graph(r, call, MetadataScope::Edge)
}

fn build_metadata(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<TypedValue, QueryError> {
    metadata_graph(r, call, MetadataScope::Both)
}

fn export_instruction(call: &Call<'_>, format: ExportFormat) -> Result<Instruction, QueryError> {
    let path = match format {
        ExportFormat::Plain => None,
        ExportFormat::Dot => Some(call.string(1)?.to_string()),
    };
    Ok(Instruction::ExportGraph {
        target: call.graph(0)?,
        format,
        force: call.has_keyword("force"),
        path,
    })
}

fn build_dump(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<(), QueryError> {
    let instruction = export_instruction(call, ExportFormat::Plain)?;
    r.push(instruction);
    Ok(())
}

fn build_export(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<(), QueryError> {
    let instruction = export_instruction(call, ExportFormat::Dot)?;
    r.push(instruction);
    Ok(())
}

fn build_stat(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<(), QueryError> {
    let target = call.graph(0)?;
    r.push(Instruction::StatGraph { target });
    Ok(())
}

fn build_native(r: &mut Resolver<'_, '_>, call: &Call<'_>) -> Result<(), QueryError> {
    let query = call.string(0)?.to_string();
    r.push(Instruction::EvaluateQuery { query });
    Ok(())
}

fn build_reset(r: &mut Resolver<'_, '_>, _call: &Call<'_>) -> Result<(), QueryError> {
    r.env.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::query::parse;
    use crate::store::SqliteBackend;

    fn resolve_text(env: &mut Environment<'_>, text: &str) -> Result<Program, QueryError> {
        let tree = parse(text)?;
        resolve(&tree, env)
    }

    fn labels(program: &Program) -> Vec<&'static str> {
        program.instructions().iter().map(|i| i.label()).collect()
    }

    #[test]
    fn union_allocates_then_populates_twice() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let program = resolve_text(&mut env, "$a = vertices(1, 2)\n$b = $a + $base")?;
        assert_eq!(
            labels(&program),
            vec![
                "CreateEmptyGraph",
                "InsertLiteralVertex",
                "CreateEmptyGraph",
                "UnionGraph",
                "UnionGraph"
            ]
        );
        assert_eq!(env.lookup("$a"), Some("trace_1"));
        assert_eq!(env.lookup("$b"), Some("trace_2"));
        Ok(())
    }

    #[test]
    fn plain_variable_assignment_aliases_without_allocation() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let program = resolve_text(&mut env, "$a = $base")?;
        assert!(program.is_empty());
        assert_eq!(env.lookup("$a"), Some("trace_base"));
        Ok(())
    }

    #[test]
    fn compound_assignment_rebinds_to_new_allocation() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let program = resolve_text(&mut env, "$a = vertices(1)\n$a -= vertices(1)")?;
        let last = program.instructions().last().expect("instruction");
        assert_eq!(
            *last,
            Instruction::SubtractGraph {
                target: Graph::new("trace_3"),
                minuend: Graph::new("trace_1"),
                subtrahend: Graph::new("trace_2"),
            }
        );
        assert_eq!(env.lookup("$a"), Some("trace_3"));
        Ok(())
    }

    #[test]
    fn lineage_arguments_are_checked() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let program = resolve_text(
            &mut env,
            "$s = vertices(1)\n$l = $base.getLineage($s, 2, 'ancestors')",
        )?;
        assert!(matches!(
            program.instructions().last(),
            Some(Instruction::GetLineage {
                depth: 2,
                direction: Direction::Ancestor,
                ..
            })
        ));

        let err = resolve_text(&mut env, "$l = $base.getLineage($s, 'two', 'a')").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::TypeMismatch {
                found: ValueKind::String,
                ..
            })
        ));
        let err = resolve_text(&mut env, "$l = $base.getLineage($s, 2, 'sideways')").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::InvalidArgument { .. })
        ));
        let err = resolve_text(&mut env, "$l = $base.getLineage($s, 2)").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::Arity { found: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn type_errors_do_not_allocate() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let err = resolve_text(&mut env, "$a = vertices(1).setMetadata('k', 'v')").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::TypeMismatch {
                found: ValueKind::GraphMetadata,
                ..
            })
        ));
        assert_eq!(env.allocate_graph()?.name(), "trace_1");
        Ok(())
    }

    #[test]
    fn reserved_and_unknown_names() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let err = resolve_text(&mut env, "$base = vertices(1)").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::ReservedVariable { .. })
        ));
        let err = resolve_text(&mut env, "stat $nope").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::UnknownVariable { .. })
        ));
        let err = resolve_text(&mut env, "frobnicate $base").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::UnknownCommand { .. })
        ));
        let err = resolve_text(&mut env, "$x = $base.explode()").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::UnknownOperation { .. })
        ));
        let err = resolve_text(&mut env, "$x += vertices(1)").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::UnknownVariable { .. })
        ));
        Ok(())
    }

    #[test]
    fn metadata_operators() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let program = resolve_text(
            &mut env,
            "@m = $base.setVertexMetadata('label', 'A')\n@n = $base.setEdgeMetadata('w', '1')\n@m += @n",
        )?;
        assert!(matches!(
            program.instructions().last(),
            Some(Instruction::OverwriteGraphMetadata { .. })
        ));
        assert_eq!(env.lookup("@m"), Some("meta_3"));

        let err = resolve_text(&mut env, "@m -= @n").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::TypeMismatch { .. })
        ));
        let err = resolve_text(&mut env, "$g = @m").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::TypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn command_keywords_and_signatures() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let program = resolve_text(&mut env, "dump force $base\nexport $base 'g.dot'")?;
        assert_eq!(
            program.instructions(),
            &[
                Instruction::ExportGraph {
                    target: Graph::base(),
                    format: ExportFormat::Plain,
                    force: true,
                    path: None,
                },
                Instruction::ExportGraph {
                    target: Graph::base(),
                    format: ExportFormat::Dot,
                    force: false,
                    path: Some("g.dot".to_string()),
                },
            ]
        );

        let err = resolve_text(&mut env, "dump quickly $base").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::InvalidArgument { .. })
        ));
        let err = resolve_text(&mut env, "reset").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::Signature { .. })
        ));
        let err = resolve_text(&mut env, "stat").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::Arity { found: 0, .. })
        ));
        let err = resolve_text(&mut env, "$x = $base.limit(0 - 1)").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::TypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn reset_environment_clears_bindings_at_resolution() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        resolve_text(&mut env, "$a = $base")?;
        let program = resolve_text(&mut env, "reset environment")?;
        assert!(program.is_empty());
        assert_eq!(env.lookup("$a"), None);
        Ok(())
    }

    #[test]
    fn failed_resolution_keeps_stored_bindings() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        resolve_text(&mut env, "$a = $base")?;
        let stored = env.lookup("$a").map(str::to_string);

        assert!(resolve_text(&mut env, "$b = $base\n$a = $b\nstat $nope").is_err());
        assert_eq!(env.lookup("$b"), None);
        assert_eq!(env.lookup("$a").map(str::to_string), stored);

        assert!(resolve_text(&mut env, "reset environment\nstat $nope").is_err());
        let reloaded = Environment::load(&backend)?;
        assert_eq!(reloaded.lookup("$a").map(str::to_string), stored);
        assert_eq!(reloaded.lookup("$b"), None);
        Ok(())
    }
}
