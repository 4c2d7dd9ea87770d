//! A small GLSL syntax tree. Programs are assembled from these nodes and
//! rendered in one pass at the end, so the same inputs always produce the
//! same source text.

use std::fmt::{self, Display, Formatter};

const INDENT: &str = "  ";

/// A uniform declaration, optionally an array
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uniform {
    pub ty: &'static str,
    pub name: &'static str,
    pub len: Option<usize>,
}

impl Uniform {
    pub fn new(ty: &'static str, name: &'static str) -> Self {
        Self { ty, name, len: None }
    }

    pub fn array(ty: &'static str, name: &'static str, len: usize) -> Self {
        Self {
            ty,
            name,
            len: Some(len),
        }
    }
}

impl Display for Uniform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.len {
            Some(len) => {
                write!(f, "uniform mediump {} {}[{}];", self.ty, self.name, len)
            }
            None => write!(f, "uniform mediump {} {};", self.ty, self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// A single line, emitted as is
    Line(String),
    If {
        condition: String,
        then: Block,
        otherwise: Option<Block>,
    },
    For {
        header: String,
        body: Block,
    },
}

/// A sequence of statements
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block(pub Vec<Statement>);

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, line: impl Into<String>) -> &mut Self {
        self.0.push(Statement::Line(line.into()));
        self
    }

    pub fn lines<'a>(
        &mut self,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> &mut Self {
        for line in lines {
            self.line(line);
        }
        self
    }

    pub fn if_then(
        &mut self,
        condition: impl Into<String>,
        then: Block,
    ) -> &mut Self {
        self.0.push(Statement::If {
            condition: condition.into(),
            then,
            otherwise: None,
        });
        self
    }

    pub fn if_else(
        &mut self,
        condition: impl Into<String>,
        then: Block,
        otherwise: Block,
    ) -> &mut Self {
        self.0.push(Statement::If {
            condition: condition.into(),
            then,
            otherwise: Some(otherwise),
        });
        self
    }

    pub fn for_loop(
        &mut self,
        header: impl Into<String>,
        body: Block,
    ) -> &mut Self {
        self.0.push(Statement::For {
            header: header.into(),
            body,
        });
        self
    }

    pub fn append(&mut self, other: Block) -> &mut Self {
        self.0.extend(other.0);
        self
    }

    fn render(&self, out: &mut String, depth: usize) {
        for statement in &self.0 {
            statement.render(out, depth);
        }
    }
}

impl Statement {
    fn render(&self, out: &mut String, depth: usize) {
        let pad = INDENT.repeat(depth);
        match self {
            Self::Line(line) => {
                out.push_str(&pad);
                out.push_str(line);
                out.push('\n');
            }
            Self::If {
                condition,
                then,
                otherwise,
            } => {
                out.push_str(&format!("{}if({}) {{\n", pad, condition));
                then.render(out, depth + 1);
                if let Some(otherwise) = otherwise {
                    out.push_str(&format!("{}}} else {{\n", pad));
                    otherwise.render(out, depth + 1);
                }
                out.push_str(&format!("{}}}\n", pad));
            }
            Self::For { header, body } => {
                out.push_str(&format!("{}for({}) {{\n", pad, header));
                body.render(out, depth + 1);
                out.push_str(&format!("{}}}\n", pad));
            }
        }
    }
}

/// A function definition
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub signature: String,
    pub body: Block,
}

impl Function {
    pub fn new(signature: impl Into<String>, body: Block) -> Self {
        Self {
            signature: signature.into(),
            body,
        }
    }
}

/// One shader stage: declarations, helper functions, then `main`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stage {
    pub uniforms: Vec<Uniform>,
    /// Attributes, varyings and other global declarations
    pub globals: Vec<String>,
    pub functions: Vec<Function>,
    pub main: Block,
}

impl Stage {
    pub fn uniform(&mut self, uniform: Uniform) -> &mut Self {
        if !self.uniforms.contains(&uniform) {
            self.uniforms.push(uniform);
        }
        self
    }

    pub fn global(&mut self, global: impl Into<String>) -> &mut Self {
        self.globals.push(global.into());
        self
    }

    pub fn function(&mut self, function: Function) -> &mut Self {
        self.functions.push(function);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for uniform in &self.uniforms {
            out.push_str(&uniform.to_string());
            out.push('\n');
        }
        for global in &self.globals {
            out.push_str(global);
            out.push('\n');
        }
        for function in &self.functions {
            out.push_str(&function.signature);
            out.push_str(" {\n");
            function.body.render(&mut out, 1);
            out.push_str("}\n");
        }
        out.push_str("void main() {\n");
        self.main.render(&mut out, 1);
        out.push_str("}\n");
        out
    }
}

/// Source of a complete program
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderProgram {
    pub vertex: String,
    pub fragment: String,
}
