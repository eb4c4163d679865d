//! In-process assembly of shader program text from composable snippets.
//!
//! Subsystems register global declarations, numbered intermediate variables
//! with explicit dependencies, and output assignments. Emission walks the
//! transitive closure reachable from the outputs in a fixed order, so the
//! same snippet sequence always produces byte-identical source and unused
//! snippets never reach the compiler. Removing a variable also removes
//! everything depending on it, which is how optional stages (clip planes,
//! the transfer function) disappear from the program cleanly.

mod tests;

use crate::error::{EngineError, Result};
use crate::gpu::{GpuContext, ProgramHandle, UniformLocation};

const VERSION_DIRECTIVE: &str = "#version 400";

struct GlobalVariable {
    name: String,
    declaration: String,
}

struct Variable {
    expression: String,
    global_deps: Vec<String>,
    variable_deps: Vec<usize>,
    deleted: bool,
}

/// One shader stage under construction
#[derive(Default)]
pub struct ShaderSource {
    globals: Vec<GlobalVariable>,
    variables: Vec<Variable>,
    outputs: Vec<usize>,
}

impl ShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, type_name: &str, name: &str) {
        self.insert_global(name, format!("in {} {};\n", type_name, name));
    }

    pub fn add_vertex_input(&mut self, type_name: &str, name: &str, layout_location: u32) {
        self.insert_global(
            name,
            format!("layout(location={}) in {} {};\n", layout_location, type_name, name),
        );
    }

    pub fn add_uniform(&mut self, type_name: &str, name: &str) {
        self.insert_global(name, format!("uniform {} {};\n", type_name, name));
    }

    pub fn add_array_uniform(&mut self, type_name: &str, name: &str, length: usize) {
        self.insert_global(name, format!("uniform {} {}[{}];\n", type_name, name, length));
    }

    pub fn add_sampler_3d(&mut self, name: &str) {
        self.insert_global(name, format!("uniform sampler3D {};\n", name));
    }

    pub fn add_sampler_1d(&mut self, name: &str) {
        self.insert_global(name, format!("uniform sampler1D {};\n", name));
    }

    /// Redeclares the vertex output block with room for the given number of
    /// clip distances
    pub fn add_clip_distance_output(&mut self, max_clip_distances: usize) {
        self.insert_global(
            "gl_PerVertex",
            format!(
                "out gl_PerVertex\n{{\n    vec4 gl_Position;\n    float gl_ClipDistance[{}];\n}};\n",
                max_clip_distances
            ),
        );
    }

    fn add_output_declaration(&mut self, type_name: &str, name: &str) {
        self.insert_global(name, format!("out {} {};\n", type_name, name));
    }

    fn insert_global(&mut self, name: &str, declaration: String) {
        if self.globals.iter().any(|global| global.name == name) {
            return;
        }
        self.globals.push(GlobalVariable {
            name: name.to_string(),
            declaration,
        });
    }

    /// A variable holding a global transformed by a matrix uniform
    pub fn add_matrix_transformed_variable(&mut self, matrix_name: &str, input_name: &str) -> usize {
        let number = self.variables.len();
        self.variables.push(Variable {
            expression: format!(
                "    vec4 variable_{} = {}*{};\n",
                number, matrix_name, input_name
            ),
            global_deps: vec![input_name.to_string(), matrix_name.to_string()],
            variable_deps: Vec::new(),
            deleted: false,
        });
        number
    }

    /// A variable sampling the red channel of a 3D texture
    pub fn add_texture_sampling_variable(
        &mut self,
        sampler_name: &str,
        coordinate_name: &str,
    ) -> usize {
        let number = self.variables.len();
        self.variables.push(Variable {
            expression: format!(
                "    float variable_{} = texture({}, {}).r;\n",
                number, sampler_name, coordinate_name
            ),
            global_deps: vec![sampler_name.to_string(), coordinate_name.to_string()],
            variable_deps: Vec::new(),
            deleted: false,
        });
        number
    }

    /// A variable applying a transfer function lookup to another variable,
    /// with the input window remap inlined
    pub fn add_transfer_function_variable(
        &mut self,
        sampler_name: &str,
        lower_limit_name: &str,
        upper_limit_name: &str,
        input_variable: usize,
    ) -> usize {
        let number = self.variables.len();
        self.variables.push(Variable {
            expression: format!(
                "    vec4 variable_{} = texture({}, (variable_{} - {})/({} - {}));\n",
                number, sampler_name, input_variable, lower_limit_name, upper_limit_name,
                lower_limit_name
            ),
            global_deps: vec![
                sampler_name.to_string(),
                lower_limit_name.to_string(),
                upper_limit_name.to_string(),
            ],
            variable_deps: vec![input_variable],
            deleted: false,
        });
        number
    }

    /// A variable computed by a free-form snippet that leaves its result in
    /// `output_name`
    pub fn add_snippet_variable(
        &mut self,
        output_type: &str,
        output_name: &str,
        snippet: &str,
        global_deps: &[&str],
        variable_deps: &[usize],
    ) -> usize {
        let number = self.variables.len();
        self.variables.push(Variable {
            expression: format!(
                "{}\n    {} variable_{} = {};\n",
                snippet, output_type, number, output_name
            ),
            global_deps: global_deps.iter().map(|name| name.to_string()).collect(),
            variable_deps: variable_deps.to_vec(),
            deleted: false,
        });
        number
    }

    /// Appends a free-standing output snippet to an existing variable
    pub fn append_output_snippet(
        &mut self,
        variable_number: usize,
        snippet: &str,
        global_deps: &[&str],
    ) -> Result<()> {
        let variable = self.live_variable_mut(variable_number)?;
        variable.expression.push_str(snippet);
        variable
            .global_deps
            .extend(global_deps.iter().map(|name| name.to_string()));
        self.outputs.push(variable_number);
        Ok(())
    }

    pub fn assign_variable_to_output(
        &mut self,
        variable_number: usize,
        output_name: &str,
    ) -> Result<()> {
        let assignment = format!("    {} = variable_{};\n", output_name, variable_number);
        let variable = self.live_variable_mut(variable_number)?;
        variable.expression.push_str(&assignment);
        self.outputs.push(variable_number);
        Ok(())
    }

    pub fn assign_transformed_variable_to_output(
        &mut self,
        matrix_name: &str,
        variable_number: usize,
        output_name: &str,
    ) -> Result<()> {
        let assignment = format!(
            "    {} = {}*variable_{};\n",
            output_name, matrix_name, variable_number
        );
        let variable = self.live_variable_mut(variable_number)?;
        variable.expression.push_str(&assignment);
        variable.global_deps.push(matrix_name.to_string());
        self.outputs.push(variable_number);
        Ok(())
    }

    pub fn assign_variable_to_new_output(
        &mut self,
        type_name: &str,
        variable_number: usize,
        output_name: &str,
    ) -> Result<()> {
        self.add_output_declaration(type_name, output_name);
        let assignment = format!("    {} = variable_{};\n", output_name, variable_number);
        let variable = self.live_variable_mut(variable_number)?;
        variable.expression.push_str(&assignment);
        variable.global_deps.push(output_name.to_string());
        self.outputs.push(variable_number);
        Ok(())
    }

    pub fn assign_input_to_new_output(
        &mut self,
        type_name: &str,
        input_name: &str,
        output_name: &str,
    ) {
        self.add_output_declaration(type_name, output_name);
        let number = self.variables.len();
        self.variables.push(Variable {
            expression: format!("    {} = {};\n", output_name, input_name),
            global_deps: vec![output_name.to_string(), input_name.to_string()],
            variable_deps: Vec::new(),
            deleted: false,
        });
        self.outputs.push(number);
    }

    /// Tombstones a variable and, iteratively, everything that depends on
    /// it. Output assignments hanging off removed variables are dropped as
    /// well, so the emitted shader shrinks instead of breaking.
    pub fn remove_variable(&mut self, variable_number: usize) -> Result<()> {
        if variable_number >= self.variables.len() {
            return Err(EngineError::InvalidConfig(format!(
                "shader variable {} does not exist",
                variable_number
            )));
        }

        let mut worklist = vec![variable_number];
        while let Some(current) = worklist.pop() {
            if self.variables[current].deleted {
                continue;
            }
            self.variables[current].deleted = true;
            self.variables[current].expression.clear();
            self.variables[current].global_deps.clear();
            self.variables[current].variable_deps.clear();

            for (number, variable) in self.variables.iter().enumerate() {
                if !variable.deleted && variable.variable_deps.contains(&current) {
                    worklist.push(number);
                }
            }
        }

        self.outputs.retain(|&number| !self.variables[number].deleted);
        Ok(())
    }

    /// Emits the shader text. The result is deterministic: globals appear
    /// in registration order filtered to the reachable set, variables in
    /// dependency order.
    pub fn generate(&self) -> Result<String> {
        if self.outputs.is_empty() {
            return Err(EngineError::InvalidConfig(
                "shader source has no output".to_string(),
            ));
        }

        let reachable = self.reachable_variables()?;

        let mut code = String::new();
        code.push_str(VERSION_DIRECTIVE);
        code.push_str("\n\n");

        for global in &self.globals {
            let required = reachable.iter().enumerate().any(|(number, &is_reachable)| {
                is_reachable
                    && self.variables[number]
                        .global_deps
                        .iter()
                        .any(|dep| *dep == global.name)
            });
            if required {
                code.push_str(&global.declaration);
            }
        }

        // every referenced global must have been declared
        for (number, &is_reachable) in reachable.iter().enumerate() {
            if !is_reachable {
                continue;
            }
            for dep in &self.variables[number].global_deps {
                if !self.globals.iter().any(|global| global.name == *dep) {
                    return Err(EngineError::UnknownName(format!(
                        "required global shader variable \"{}\"",
                        dep
                    )));
                }
            }
        }

        code.push_str("\nvoid main(void)\n{\n");

        let mut written = vec![false; self.variables.len()];
        for &output in &self.outputs {
            self.write_variable_expressions(output, &mut written, &mut code)?;
        }

        code.push_str("}\n");
        Ok(code)
    }

    fn reachable_variables(&self) -> Result<Vec<bool>> {
        let mut reachable = vec![false; self.variables.len()];
        let mut worklist: Vec<usize> = self.outputs.clone();

        while let Some(current) = worklist.pop() {
            if current >= self.variables.len() {
                return Err(EngineError::InvalidConfig(format!(
                    "shader variable {} does not exist",
                    current
                )));
            }
            if self.variables[current].deleted {
                return Err(EngineError::InvalidConfig(format!(
                    "use of deleted shader variable {}",
                    current
                )));
            }
            if reachable[current] {
                continue;
            }
            reachable[current] = true;
            worklist.extend_from_slice(&self.variables[current].variable_deps);
        }
        Ok(reachable)
    }

    fn write_variable_expressions(
        &self,
        variable_number: usize,
        written: &mut [bool],
        code: &mut String,
    ) -> Result<()> {
        if written[variable_number] {
            return Ok(());
        }

        let variable = &self.variables[variable_number];
        if variable.deleted {
            return Err(EngineError::InvalidConfig(format!(
                "use of deleted shader variable {}",
                variable_number
            )));
        }

        for &dep in &variable.variable_deps {
            self.write_variable_expressions(dep, written, code)?;
        }

        code.push_str(&variable.expression);
        written[variable_number] = true;
        Ok(())
    }

    fn live_variable_mut(&mut self, variable_number: usize) -> Result<&mut Variable> {
        match self.variables.get_mut(variable_number) {
            Some(variable) if !variable.deleted => Ok(variable),
            Some(_) => Err(EngineError::InvalidConfig(format!(
                "use of deleted shader variable {}",
                variable_number
            ))),
            None => Err(EngineError::InvalidConfig(format!(
                "shader variable {} does not exist",
                variable_number
            ))),
        }
    }
}

/// A shader program as the owner of its two sources, its GPU handle and the
/// uniforms bound to it
pub struct ShaderProgram {
    pub vertex_source: ShaderSource,
    pub fragment_source: ShaderSource,
    handle: Option<ProgramHandle>,
}

impl Default for ShaderProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderProgram {
    pub fn new() -> Self {
        Self {
            vertex_source: ShaderSource::new(),
            fragment_source: ShaderSource::new(),
            handle: None,
        }
    }

    /// Generates both stages and compiles them into a linked program
    pub fn build(&mut self, gpu: &mut dyn GpuContext) -> Result<ProgramHandle> {
        let vertex_code = self.vertex_source.generate()?;
        let fragment_code = self.fragment_source.generate()?;

        let handle = gpu.compile_program(&vertex_code, &fragment_code)?;
        self.handle = Some(handle);
        Ok(handle)
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    pub fn destroy(&mut self, gpu: &mut dyn GpuContext) {
        if let Some(handle) = self.handle.take() {
            gpu.delete_program(handle);
        }
    }
}

/// A named uniform whose location is resolved against a linked program.
/// Uniforms pruned by the shader generator simply stay unlocated and their
/// updates become no-ops.
#[derive(Debug, Clone)]
pub struct Uniform {
    name: String,
    location: Option<UniformLocation>,
}

impl Uniform {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn load(&mut self, gpu: &mut dyn GpuContext, program: ProgramHandle) {
        self.location = gpu.uniform_location(program, &self.name);
    }

    pub fn location(&self) -> Option<UniformLocation> {
        self.location
    }
}
