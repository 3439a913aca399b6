//! Closed option sets that configure prompt composition and orchestration.
//!
//! Every option is a plain enum parsed from its string form at the boundary.
//! An unknown string fails with [`InvalidConfiguration`](crate::InvalidConfiguration)
//! instead of silently falling back to a default.

// ---------------------------------------------------------------------------
// Macro for closed string-backed option enums.
// Generates: enum, ALL, CHOICES, FIELD, as_str(), FromStr, Display, serde.
// ---------------------------------------------------------------------------

/// Declares a closed option enum with one canonical string per variant.
///
/// ```
/// pipeline::choice_enum! {
///     /// Example option.
///     Shade as "shade" {
///         /// Light variant.
///         Light => "light",
///         /// Dark variant.
///         Dark => "dark",
///     }
/// }
///
/// assert_eq!("dark".parse::<Shade>().unwrap(), Shade::Dark);
/// assert!("grey".parse::<Shade>().is_err());
/// ```
#[macro_export]
macro_rules! choice_enum {
    (
        $(#[$attr:meta])*
        $name:ident as $field:literal {
            $(
                $(#[$vattr:meta])*
                $variant:ident => $text:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                $(#[$vattr])*
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Accepted string forms, in declaration order.
            pub const CHOICES: &'static [&'static str] = &[$($text),+];

            /// Name of the option this enum configures.
            pub const FIELD: &'static str = $field;

            /// Returns the canonical string form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::InvalidConfiguration;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::InvalidConfiguration::unknown_choice(
                        $field,
                        other,
                        Self::CHOICES,
                    )),
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::__serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::__serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> $crate::__serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::__serde::Deserializer<'de>,
            {
                let value = <::std::string::String as $crate::__serde::Deserialize>::deserialize(
                    deserializer,
                )?;
                value
                    .parse()
                    .map_err(<D::Error as $crate::__serde::de::Error>::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Composer options
// ---------------------------------------------------------------------------

choice_enum! {
    /// Fixed textual scaffold the composer embeds the base text into.
    TemplateStyle as "template_style" {
        /// Guideline-driven assistant framing: precise, structured, objective.
        QwenStyle => "qwen_style",
        /// Step-by-step reasoning scaffold.
        ChainOfThought => "chain_of_thought",
        /// Analysis along fixed dimensions (content, technique, aesthetics...).
        StructuredAnalysis => "structured_analysis",
        /// Vivid narrative framing.
        CreativeNarrative => "creative_narrative",
        /// Hierarchical technical documentation framing.
        TechnicalDocumentation => "technical_documentation",
    }
}

choice_enum! {
    /// Format the model is asked to answer in.
    OutputFormat as "output_format" {
        /// Unformatted prose.
        Plain => "plain",
        /// Markdown.
        Markdown => "markdown",
        /// A single valid JSON document.
        Json => "json",
        /// XML-tagged content.
        Xml => "xml",
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Plain
    }
}

choice_enum! {
    /// Verbosity the model is asked for.
    DetailLevel as "detail_level" {
        /// Key information only.
        Concise => "concise",
        /// Balanced detail.
        Standard => "standard",
        /// Comprehensive detail and explanation.
        Detailed => "detailed",
        /// Nothing left unexamined.
        Exhaustive => "exhaustive",
    }
}

impl Default for DetailLevel {
    fn default() -> Self {
        Self::Standard
    }
}

// ---------------------------------------------------------------------------
// Orchestrator options
// ---------------------------------------------------------------------------

choice_enum! {
    /// Instruction applied on every refinement pass.
    RefinementStrategy as "refinement_strategy" {
        /// Make the text clearer without losing accuracy.
        Clarify => "clarify",
        /// Add relevant detail and examples.
        Expand => "expand",
        /// Tighten the text around its key information.
        Focus => "focus",
        /// Reorganise for flow and logical structure.
        Restructure => "restructure",
        /// General quality pass against the optimisation targets.
        EnhanceQuality => "enhance_quality",
    }
}

impl Default for RefinementStrategy {
    fn default() -> Self {
        Self::EnhanceQuality
    }
}

choice_enum! {
    /// How the outputs of a completed prompt chain are merged.
    CombinationMode as "combination_mode" {
        /// Ordered concatenation; no extra service call.
        Append => "append",
        /// One extra call that synthesizes all outputs into one text.
        Synthesize => "synthesize",
        /// One extra call that distils bullet-point insights.
        ExtractKeyPoints => "extract_key_points",
        /// One extra call that produces a sectioned markdown composite.
        StructuredMerge => "structured_merge",
    }
}

impl CombinationMode {
    /// Returns `true` if this mode issues a final completion call.
    pub fn requires_completion(self) -> bool {
        !matches!(self, Self::Append)
    }
}

impl Default for CombinationMode {
    fn default() -> Self {
        Self::Synthesize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_choice_parses_to_its_variant() {
        for (text, style) in TemplateStyle::CHOICES.iter().zip(TemplateStyle::ALL) {
            assert_eq!(text.parse::<TemplateStyle>().unwrap(), *style);
            assert_eq!(style.as_str(), *text);
        }
        for (text, mode) in CombinationMode::CHOICES.iter().zip(CombinationMode::ALL) {
            assert_eq!(text.parse::<CombinationMode>().unwrap(), *mode);
        }
    }

    #[test]
    fn test_unknown_choice_fails_fast() {
        let err = "summarize".parse::<RefinementStrategy>().unwrap_err();
        assert_eq!(err.field, "refinement_strategy");
        assert!(err.message.contains("enhance_quality"));
    }

    #[test]
    fn test_choice_parsing_trims_whitespace() {
        assert_eq!(" json ".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
    }

    #[test]
    fn test_choice_serde_uses_canonical_strings() {
        let json = serde_json::to_string(&CombinationMode::ExtractKeyPoints).unwrap();
        assert_eq!(json, r#""extract_key_points""#);

        let parsed: DetailLevel = serde_json::from_str(r#""exhaustive""#).unwrap();
        assert_eq!(parsed, DetailLevel::Exhaustive);

        assert!(serde_json::from_str::<DetailLevel>(r#""verbose""#).is_err());
    }

    #[test]
    fn test_only_append_skips_the_combination_call() {
        assert!(!CombinationMode::Append.requires_completion());
        assert!(CombinationMode::Synthesize.requires_completion());
        assert!(CombinationMode::ExtractKeyPoints.requires_completion());
        assert!(CombinationMode::StructuredMerge.requires_completion());
    }
}
