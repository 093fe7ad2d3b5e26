//! Generated Go sources of the build module

/// `main.go` of the build module: runs the base program's command
pub fn main_source(base_import_path: &str) -> String {
    format!(
        r#"package main

import (
	k6cmd "{base_import_path}/cmd"
)

func main() {{
	k6cmd.Execute()
}}
"#
    )
}

/// Source file whose only purpose is to link `import_path` into the binary
pub fn import_source(import_path: &str) -> String {
    format!("package main\n\nimport _ \"{import_path}\"\n")
}

/// File name of the blank import of `import_path`
pub fn import_file_name(import_path: &str) -> String {
    format!("{}.go", import_path.replace('/', "_"))
}
