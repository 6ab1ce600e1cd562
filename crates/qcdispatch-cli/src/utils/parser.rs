use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid --set format: '{0}'. Expected KEY=VALUE.")]
    InvalidAssignment(String),

    #[error("Empty key in --set assignment '{0}'.")]
    EmptyKey(String),

    #[error("Invalid k-point mesh '{0}'. Expected three positive integers (e.g. '4,4,1' or '4x4x1').")]
    InvalidKpoints(String),
}

/// Splits `KEY=VALUE`, trimming both sides. The value may itself contain `=`.
pub fn parse_assignment(input: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidAssignment(input.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::EmptyKey(input.to_string()));
    }
    Ok((key, value.trim()))
}

/// Parses a Monkhorst-Pack mesh written as `4,4,1`, `4x4x1`, `4-4-1` or `4 4 1`.
pub fn parse_kpoints(input: &str) -> Result<[u32; 3], ParseError> {
    let invalid = || ParseError::InvalidKpoints(input.to_string());
    let values: Vec<u32> = input
        .split(|c: char| c == ',' || c == 'x' || c == 'X' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        &[a, b, c] if a > 0 && b > 0 && c > 0 => Ok([a, b, c]),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_keeps_equals_in_value() {
        assert_eq!(
            parse_assignment("vasp.command = mpprun vasp_std --opt=1").unwrap(),
            ("vasp.command", "mpprun vasp_std --opt=1")
        );
    }

    #[test]
    fn assignment_requires_key_and_separator() {
        assert_eq!(
            parse_assignment("job.encut"),
            Err(ParseError::InvalidAssignment("job.encut".into()))
        );
        assert_eq!(parse_assignment("=5"), Err(ParseError::EmptyKey("=5".into())));
    }

    #[test]
    fn kpoints_accept_common_separators() {
        for input in ["4,4,1", "4x4x1", "4-4-1", " 4 4 1 "] {
            assert_eq!(parse_kpoints(input).unwrap(), [4, 4, 1], "{}", input);
        }
    }

    #[test]
    fn kpoints_reject_wrong_length_and_zero() {
        assert!(parse_kpoints("4,4").is_err());
        assert!(parse_kpoints("4,0,1").is_err());
        assert!(parse_kpoints("a,b,c").is_err());
    }
}
