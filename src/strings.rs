//! Validity checks for the names that appear in introspection data.
//!
//! Member names are one element: an ASCII letter or underscore followed
//! by letters, digits and underscores, at most 255 bytes. Interface
//! names are two or more such elements joined by `.`, with the same
//! overall length limit. Symbols (the generated-identifier form of a
//! name) follow the member rule.

/// One name element: `[A-Za-z_][A-Za-z0-9_]*`.
fn is_valid_element(s: &str) -> bool {
    !s.is_empty()
        && s.chars().enumerate().all(|(i, c)| match c {
            'A'..='Z' | 'a'..='z' | '_' => true,
            '0'..='9' => i > 0,
            _ => false,
        })
}

pub fn is_valid_member_name(s: &str) -> Result<(), ()> {
    if s.len() <= 255 && is_valid_element(s) {
        Ok(())
    } else {
        Err(())
    }
}

/// Symbols use the same alphabet as member names; the only difference is
/// intent (a symbol names a generated function, not a D-Bus member).
pub fn is_valid_symbol(s: &str) -> Result<(), ()> {
    is_valid_member_name(s)
}

pub fn is_valid_interface_name(s: &str) -> Result<(), ()> {
    if s.len() > 255 {
        return Err(());
    }
    let mut elements = 0;
    for element in s.split('.') {
        if !is_valid_element(element) {
            return Err(());
        }
        elements += 1;
    }
    if elements >= 2 {
        Ok(())
    } else {
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member() {
        assert!(is_valid_member_name("").is_err());
        assert!(is_valid_member_name("He11o").is_ok());
        assert!(is_valid_member_name("_").is_ok());
        assert!(is_valid_member_name("He11o!").is_err());
        assert!(is_valid_member_name("1Hello").is_err());
        assert!(is_valid_member_name("Hello.World").is_err());
        assert!(is_valid_member_name(&"x".repeat(255)).is_ok());
        assert!(is_valid_member_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn interface() {
        assert!(is_valid_interface_name("").is_err());
        assert!(is_valid_interface_name("He11o").is_err());
        assert!(is_valid_interface_name("Hello.").is_err());
        assert!(is_valid_interface_name(".Hello").is_err());
        assert!(is_valid_interface_name("Hello..World").is_err());
        assert!(is_valid_interface_name("Hello!.World").is_err());
        assert!(is_valid_interface_name("ZZZ.1Hello").is_err());
        assert!(is_valid_interface_name("Hello.W0rld").is_ok());
        assert!(is_valid_interface_name("com.example.Frodo.T_41").is_ok());
        assert!(is_valid_interface_name(":1.54").is_err());
        let long = format!("a.{}", "b".repeat(254));
        assert!(is_valid_interface_name(&long).is_err());
    }
}
