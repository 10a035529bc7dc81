//! Built-in L-systems
//!
//! Classic curves plus a few plants that exercise brackets, stochastic
//! rules, tropism and models. Used as the default config when no manifest
//! is present.

use crate::lsystem::GrammarState;
use crate::renderer::RendererSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    DragonCurve,
    KochSnowflake,
    SierpinskiArrowhead,
    HilbertCurve,
    PeanoCurve,
    GosperCurve,
    FractalPlant,
    StochasticBush,
    TropismTree,
    Flower,
}

fn rules(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|r| r.to_string()).collect()
}

impl Preset {
    pub const ALL: [Preset; 10] = [
        Preset::DragonCurve,
        Preset::KochSnowflake,
        Preset::SierpinskiArrowhead,
        Preset::HilbertCurve,
        Preset::PeanoCurve,
        Preset::GosperCurve,
        Preset::FractalPlant,
        Preset::StochasticBush,
        Preset::TropismTree,
        Preset::Flower,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Preset::DragonCurve => "dragon",
            Preset::KochSnowflake => "koch",
            Preset::SierpinskiArrowhead => "sierpinski",
            Preset::HilbertCurve => "hilbert",
            Preset::PeanoCurve => "peano",
            Preset::GosperCurve => "gosper",
            Preset::FractalPlant => "plant",
            Preset::StochasticBush => "bush",
            Preset::TropismTree => "tree",
            Preset::Flower => "flower",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::DragonCurve => "Heighway Dragon",
            Preset::KochSnowflake => "Koch Snowflake",
            Preset::SierpinskiArrowhead => "Sierpinski Arrowhead",
            Preset::HilbertCurve => "Hilbert Curve",
            Preset::PeanoCurve => "Peano Curve",
            Preset::GosperCurve => "Gosper Curve (Flowsnake)",
            Preset::FractalPlant => "Fractal Plant",
            Preset::StochasticBush => "Stochastic Bush",
            Preset::TropismTree => "Tree with Tropism",
            Preset::Flower => "Flower",
        }
    }

    pub fn grammar(&self) -> GrammarState {
        let (axiom, rule_lines, angle, ignore): (&str, &[&str], &str, &str) = match self {
            // F → F+G, G → F-G
            Preset::DragonCurve => ("F", &["F=F+G", "G=F-G"], "90", ""),
            Preset::KochSnowflake => ("F--F--F", &["F=F+F--F+F"], "60", ""),
            Preset::SierpinskiArrowhead => ("F", &["F=G-F-G", "G=F+G+F"], "60", ""),
            Preset::HilbertCurve => ("A", &["A=-BF+AFA+FB-", "B=+AF-BFB-FA+"], "90", "AB"),
            Preset::PeanoCurve => ("F", &["F=F+F-F-F-F+F+F+F-F"], "90", ""),
            Preset::GosperCurve => ("A", &["A=A-B--B+A++AA+B-", "B=+A-BB--B-A++A+B"], "60", ""),
            Preset::FractalPlant => ("X", &["X=F+[[X]-X]-F[-FX]+X", "F=FF"], "25", "X"),
            Preset::StochasticBush => ("F", &["F=F[+F]F[-F]F,F[+F]F,F[-F]F"], "25.7", ""),
            Preset::TropismTree => (
                "FA",
                &["A=[&FTA]/////[&FTA]///////[&FTA]", "F=FT"],
                "22.5",
                "A",
            ),
            Preset::Flower => (
                "F~L",
                &["F=F[+F~L]F[-F~L]F", "~L={.+F.-F.-F.},{.-F.+F.+F.}"],
                "30",
                "L",
            ),
        };

        GrammarState {
            axiom: axiom.to_string(),
            rules: rules(rule_lines),
            angle: angle.to_string(),
            seed: match self {
                Preset::StochasticBush => 12345,
                Preset::Flower => 7,
                _ => 0,
            },
            ignore: ignore.to_string(),
            tropism: match self {
                Preset::TropismTree => "0.14".to_string(),
                _ => "0".to_string(),
            },
        }
    }

    pub fn settings(&self) -> RendererSettings {
        let figure_scale = match self {
            Preset::DragonCurve => "sqrt(2)^lv",
            Preset::KochSnowflake | Preset::PeanoCurve => "3^lv",
            Preset::SierpinskiArrowhead | Preset::HilbertCurve => "2^lv",
            Preset::GosperCurve => "sqrt(7)^lv",
            Preset::FractalPlant => "2^lv",
            Preset::StochasticBush => "2.5^lv",
            Preset::TropismTree => "lv + 1",
            Preset::Flower => "3^lv",
        };
        let plant = matches!(
            self,
            Preset::FractalPlant | Preset::StochasticBush | Preset::TropismTree | Preset::Flower
        );
        RendererSettings {
            figure_scale: figure_scale.to_string(),
            upright: plant,
            hesitate_apex: plant,
            hesitate_fork: plant,
            quick_draw: !plant,
            ..RendererSettings::default()
        }
    }
}
