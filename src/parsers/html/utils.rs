use cssparser::{parse_important, Delimiter, ParseError, Parser, ParserInput};

/// ASCII 空白字符
pub const WHITESPACES: &[char] = &[' ', '\t', '\n', '\x0c', '\r'];

/// 检查文本是否为空或只包含空白
pub fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

/// 检查内联样式是否声明了 `display: none`
///
/// 只看内联 `style` 属性，多次声明时以最后一次有效声明为准
pub fn style_hides_element(style: &str) -> bool {
    let mut input = ParserInput::new(style);
    let mut parser = Parser::new(&mut input);
    let mut hidden = false;

    while !parser.is_exhausted() {
        // 无效声明整体忽略
        if let Ok(Some(value)) = parser.parse_until_after(Delimiter::Semicolon, display_is_none) {
            hidden = value;
        }
    }

    hidden
}

/// 解析单条声明；不是 `display` 时返回 `None`
fn display_is_none<'i>(parser: &mut Parser<'i, '_>) -> Result<Option<bool>, ParseError<'i, ()>> {
    let is_display = parser.expect_ident()?.eq_ignore_ascii_case("display");
    parser.expect_colon()?;
    if !is_display {
        while parser.next().is_ok() {}
        return Ok(None);
    }

    let is_none = parser.expect_ident()?.eq_ignore_ascii_case("none");
    let _ = parser.try_parse(parse_important);
    parser.expect_exhausted()?;
    Ok(Some(is_none))
}

/// 解析 `contenteditable` 属性值
///
/// 返回 `Some(true)` 表示可编辑，`Some(false)` 表示显式不可编辑，
/// `None` 表示值无效（视同未设置，继承父级）
pub fn parse_contenteditable(value: &str) -> Option<bool> {
    match value.trim_matches(WHITESPACES).to_ascii_lowercase().as_str() {
        "" | "true" | "plaintext-only" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_blank() {
        assert!(is_blank(""));
        assert!(is_blank(" \n\t "));
        assert!(!is_blank("  a "));
    }

    #[test]
    fn test_style_hides_element() {
        assert!(style_hides_element("display:none"));
        assert!(style_hides_element("color: red; DISPLAY : None !important"));
        assert!(!style_hides_element("display: block"));
        assert!(!style_hides_element("display: none; display: inline"));
        assert!(!style_hides_element("visibility: hidden"));
        assert!(!style_hides_element(""));
    }

    #[test]
    fn test_style_comments_and_strings() {
        assert!(style_hides_element("display:/* x */none"));
        assert!(style_hides_element("/* lead */ display /* a */ : none /* b */ ;"));
        assert!(!style_hides_element(r#"--v: "1;display:none;""#));
        assert!(!style_hides_element(r#"content: "display:none""#));
        assert!(style_hides_element(r#"content: ";"; display: none"#));
    }

    #[test]
    fn test_style_invalid_declarations_ignored() {
        assert!(style_hides_element("display: none; display: none block"));
        assert!(!style_hides_element("display: none none"));
        assert!(!style_hides_element("display none"));
        assert!(style_hides_element(";;display:none;;"));
    }

    #[test]
    fn test_parse_contenteditable() {
        assert_eq!(parse_contenteditable(""), Some(true));
        assert_eq!(parse_contenteditable("TRUE"), Some(true));
        assert_eq!(parse_contenteditable("plaintext-only"), Some(true));
        assert_eq!(parse_contenteditable("false"), Some(false));
        assert_eq!(parse_contenteditable("inherit"), None);
    }
}
