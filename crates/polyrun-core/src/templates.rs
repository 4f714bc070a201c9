//! Starter programs shown to new users.

use crate::language::Language;

const PYTHON: &str = r#"print("Hello, World!")"#;

const C: &str = r#"#include <stdio.h>

int main() {
    printf("Hello, World!\n");
    return 0;
}"#;

const CPP: &str = r#"#include <iostream>
using namespace std;

int main() {
    cout << "Hello, World!" << endl;
    return 0;
}"#;

const JAVA: &str = r#"public class Main {
    public static void main(String[] args) {
        System.out.println("Hello, World!");
    }
}"#;

/// The hello-world program for `language`.
pub fn template(language: Language) -> &'static str {
    match language {
        Language::Python => PYTHON,
        Language::C => C,
        Language::Cpp => CPP,
        Language::Java => JAVA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::Toolchains;
    use crate::validate::Validator;

    #[test]
    fn test_templates_pass_all_checks() {
        let validator = Validator::default();
        let toolchains = Toolchains::default();
        for language in Language::ALL {
            let source = template(language);
            assert!(validator.validate(language, source).is_ok(), "{language}");
            assert!(toolchains.get(language).precheck(source).is_ok(), "{language}");
        }
    }
}
