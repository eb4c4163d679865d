#[cfg(test)]
mod shader_source_tests {
    use crate::shadergen::ShaderSource;

    fn minimal_source() -> ShaderSource {
        let mut source = ShaderSource::new();
        source.add_vertex_input("vec4", "in_position", 0);
        source.add_uniform("mat4", "model_view_projection");
        let position = source.add_matrix_transformed_variable("model_view_projection", "in_position");
        source
            .assign_variable_to_output(position, "gl_Position")
            .ok()
            .unwrap();
        source
    }

    #[test]
    fn test_generation_is_deterministic() {
        let first = minimal_source().generate().ok().unwrap();
        let second = minimal_source().generate().ok().unwrap();
        assert!(first == second);
    }

    #[test]
    fn test_generated_code_has_version_globals_and_main() {
        let code = minimal_source().generate().ok().unwrap();

        assert!(code.starts_with("#version 400\n"));
        assert!(code.contains("layout(location=0) in vec4 in_position;"));
        assert!(code.contains("uniform mat4 model_view_projection;"));
        assert!(code.contains("void main(void)"));
        assert!(code.contains("vec4 variable_0 = model_view_projection*in_position;"));
        assert!(code.contains("gl_Position = variable_0;"));
    }

    #[test]
    fn test_unreferenced_globals_are_not_emitted() {
        let mut source = ShaderSource::new();
        source.add_uniform("float", "used");
        source.add_uniform("float", "unused");
        let variable = source.add_snippet_variable("float", "value", "    float value = used;", &["used"], &[]);
        source.assign_variable_to_new_output("float", variable, "out_value").ok().unwrap();

        let code = source.generate().ok().unwrap();
        assert!(code.contains("uniform float used;"));
        assert!(!code.contains("unused"));
    }

    #[test]
    fn test_dependencies_are_written_before_dependents_once() {
        let mut source = ShaderSource::new();
        source.add_uniform("float", "base");
        let first = source.add_snippet_variable("float", "a", "    float a = base;", &["base"], &[]);
        let second = source.add_snippet_variable(
            "float",
            "b",
            &format!("    float b = 2.0*variable_{};", first),
            &[],
            &[first],
        );
        let third = source.add_snippet_variable(
            "float",
            "c",
            &format!("    float c = variable_{} + variable_{};", first, second),
            &[],
            &[first, second],
        );
        source.assign_variable_to_new_output("float", third, "out_value").ok().unwrap();

        let code = source.generate().ok().unwrap();
        let first_pos = code.find("float a = base;").unwrap();
        let second_pos = code.find("float b = 2.0*variable_0;").unwrap();
        let third_pos = code.find("float c = variable_0 + variable_1;").unwrap();
        assert!(first_pos < second_pos && second_pos < third_pos);

        // the shared dependency is emitted exactly once
        assert!(code.matches("float a = base;").count() == 1);
    }

    #[test]
    fn test_no_output_is_rejected() {
        let mut source = ShaderSource::new();
        source.add_uniform("float", "lonely");
        assert!(source.generate().is_err());
    }

    #[test]
    fn test_missing_global_declaration_is_rejected() {
        let mut source = ShaderSource::new();
        let variable =
            source.add_snippet_variable("float", "value", "    float value = ghost;", &["ghost"], &[]);
        source.assign_variable_to_new_output("float", variable, "out_value").ok().unwrap();

        assert!(source.generate().is_err());
    }

    #[test]
    fn test_removal_cascades_through_dependents() {
        let mut source = ShaderSource::new();
        source.add_uniform("float", "base");
        let root = source.add_snippet_variable("float", "a", "    float a = base;", &["base"], &[]);
        let middle = source.add_snippet_variable(
            "float",
            "b",
            &format!("    float b = variable_{};", root),
            &[],
            &[root],
        );
        source.assign_variable_to_new_output("float", middle, "out_b").ok().unwrap();

        let keeper = source.add_snippet_variable("float", "k", "    float k = 1.0;", &[], &[]);
        source.assign_variable_to_new_output("float", keeper, "out_k").ok().unwrap();

        source.remove_variable(root).ok().unwrap();

        let code = source.generate().ok().unwrap();
        assert!(!code.contains("float a"));
        assert!(!code.contains("float b"));
        assert!(!code.contains("uniform float base;"));
        assert!(code.contains("float k = 1.0;"));
    }

    #[test]
    fn test_deleted_variable_cannot_be_assigned() {
        let mut source = ShaderSource::new();
        let variable = source.add_snippet_variable("float", "v", "    float v = 1.0;", &[], &[]);
        source.remove_variable(variable).ok().unwrap();

        assert!(source.assign_variable_to_output(variable, "out_value").is_err());
        assert!(source.remove_variable(999).is_err());
    }

    #[test]
    fn test_transfer_function_variable_applies_window() {
        let mut source = ShaderSource::new();
        source.add_sampler_3d("field_texture");
        source.add_input("vec3", "tex_coord");
        source.add_sampler_1d("transfer_function");
        source.add_uniform("float", "tf_lower_limit");
        source.add_uniform("float", "tf_upper_limit");

        let sampled = source.add_texture_sampling_variable("field_texture", "tex_coord");
        let mapped = source.add_transfer_function_variable(
            "transfer_function",
            "tf_lower_limit",
            "tf_upper_limit",
            sampled,
        );
        source.assign_variable_to_new_output("vec4", mapped, "out_color").ok().unwrap();

        let code = source.generate().ok().unwrap();
        assert!(code.contains("texture(field_texture, tex_coord).r;"));
        assert!(code.contains(
            "texture(transfer_function, (variable_0 - tf_lower_limit)/(tf_upper_limit - tf_lower_limit));"
        ));
        assert!(code.contains("out vec4 out_color;"));
    }
}

#[cfg(test)]
mod shader_program_tests {
    use crate::gpu::HeadlessGpu;
    use crate::shadergen::{ShaderProgram, Uniform};

    #[test]
    fn test_program_build_compiles_both_stages() {
        let mut gpu = HeadlessGpu::new();
        let mut program = ShaderProgram::new();

        program.vertex_source.add_vertex_input("vec4", "in_position", 0);
        let variable = program
            .vertex_source
            .add_snippet_variable("vec4", "p", "    vec4 p = in_position;", &["in_position"], &[]);
        program
            .vertex_source
            .assign_variable_to_output(variable, "gl_Position")
            .ok()
            .unwrap();

        program.fragment_source.add_input("vec4", "ex_color");
        program
            .fragment_source
            .assign_input_to_new_output("vec4", "ex_color", "out_color");

        let handle = program.build(&mut gpu).ok().unwrap();
        assert!(program.handle() == Some(handle));

        let (vertex_code, fragment_code) = gpu.program_sources(handle).unwrap();
        assert!(vertex_code.contains("gl_Position"));
        assert!(fragment_code.contains("out_color = ex_color;"));
    }

    #[test]
    fn test_uniform_resolves_location_after_build() {
        let mut gpu = HeadlessGpu::new();
        let mut program = ShaderProgram::new();
        program.vertex_source.add_vertex_input("vec4", "in_position", 0);
        program
            .vertex_source
            .assign_input_to_new_output("vec4", "in_position", "gl_Position");
        program.fragment_source.add_input("vec4", "ex_color");
        program
            .fragment_source
            .assign_input_to_new_output("vec4", "ex_color", "out_color");
        let handle = program.build(&mut gpu).ok().unwrap();

        let mut uniform = Uniform::new("brick_offset");
        assert!(uniform.location().is_none());
        uniform.load(&mut gpu, handle);
        assert!(uniform.location().is_some());
        assert!(uniform.name() == "brick_offset");
    }
}
