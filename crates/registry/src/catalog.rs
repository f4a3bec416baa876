use shared::domain::{ParameterSpec, ProjectDescriptor, UnitRef};

/// Projects backed by the units compiled into this workspace.
pub fn builtin_catalog() -> Vec<ProjectDescriptor> {
    vec![
        ProjectDescriptor::new(
            "calculator",
            "Calculator",
            "Utility",
            UnitRef::new("calculator", "calculate"),
        )
        .description("A simple calculator application")
        .param(ParameterSpec::string(
            "expression",
            "Mathematical expression to evaluate",
        )),
        ProjectDescriptor::new(
            "password_generator",
            "Password Generator",
            "Security",
            UnitRef::new("password_generator", "generate_password"),
        )
        .description("Generate secure random passwords")
        .param(ParameterSpec::number("length", "Password length").with_default(12))
        .param(ParameterSpec::boolean("include_symbols", "Include symbols").with_default(true))
        .param(ParameterSpec::boolean("include_numbers", "Include numbers").with_default(true))
        .param(
            ParameterSpec::boolean("include_uppercase", "Include uppercase letters")
                .with_default(true),
        )
        .param(
            ParameterSpec::boolean("include_lowercase", "Include lowercase letters")
                .with_default(true),
        ),
        ProjectDescriptor::new(
            "memorable_password",
            "Memorable Password",
            "Security",
            UnitRef::new("password_generator", "generate_memorable_password"),
        )
        .description("Generate an easy to remember password from common words")
        .param(ParameterSpec::number("word_count", "Number of words").with_default(4))
        .param(ParameterSpec::string("separator", "Word separator").with_default("-")),
        ProjectDescriptor::new(
            "qr_generator",
            "QR Code Generator",
            "Utility",
            UnitRef::new("qr_generator", "generate_qr"),
        )
        .description("Generate QR codes from text")
        .param(ParameterSpec::string("text", "Text to encode in QR code"))
        .param(ParameterSpec::number("size", "Pixels per module").with_default(10))
        .param(ParameterSpec::number("border", "Quiet zone width in modules").with_default(4)),
        ProjectDescriptor::new(
            "web_link_extractor",
            "Web Link Extractor",
            "Web",
            UnitRef::new("web_link_extractor", "extract_links"),
        )
        .description("Extract all links from any webpage with filtering options")
        .param(ParameterSpec::string(
            "url",
            "URL of the webpage to extract links from",
        ))
        .param(
            ParameterSpec::number("max_links", "Maximum number of links to return")
                .with_default(50),
        )
        .param(
            ParameterSpec::boolean("filter_internal", "Only show internal links (same domain)")
                .with_default(false),
        )
        .param(
            ParameterSpec::boolean(
                "filter_external",
                "Only show external links (different domain)",
            )
            .with_default(false),
        )
        .param(
            ParameterSpec::boolean("include_emails", "Include email links (mailto:)")
                .with_default(true),
        ),
    ]
}
