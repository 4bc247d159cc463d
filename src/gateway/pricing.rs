//! Static price factors per model and modality.
//!
//! Factors are USD per million units. Chat models bill token counts reported
//! by the API; dedicated TTS models bill character counts, so their factors
//! are rough per-character estimates derived from the published per-million
//! character prices.

use crate::error::PipelineError;

struct ModalityPricing {
    modality: &'static str,
    input_factor: f64,
    output_factor: f64,
}

struct ModelPricing {
    model: &'static str,
    modalities: &'static [ModalityPricing],
}

const PRICE_TABLE: &[ModelPricing] = &[
    ModelPricing {
        model: "gpt-4o",
        modalities: &[ModalityPricing {
            modality: "text",
            input_factor: 2.5,
            output_factor: 10.0,
        }],
    },
    ModelPricing {
        model: "gpt-4o-audio-preview",
        modalities: &[
            ModalityPricing {
                modality: "text",
                input_factor: 2.5,
                output_factor: 10.0,
            },
            ModalityPricing {
                modality: "audio",
                input_factor: 40.0,
                output_factor: 80.0,
            },
        ],
    },
    ModelPricing {
        model: "gpt-4o-mini-audio-preview",
        modalities: &[
            ModalityPricing {
                modality: "text",
                input_factor: 0.15,
                output_factor: 0.6,
            },
            ModalityPricing {
                modality: "audio",
                input_factor: 10.0,
                output_factor: 20.0,
            },
        ],
    },
    ModelPricing {
        model: "gpt-4o-mini",
        modalities: &[ModalityPricing {
            modality: "text",
            input_factor: 0.15,
            output_factor: 0.6,
        }],
    },
    ModelPricing {
        model: "tts-1",
        modalities: &[ModalityPricing {
            modality: "text",
            input_factor: 4.0,
            output_factor: 4.0,
        }],
    },
    ModelPricing {
        model: "tts-1-hd",
        modalities: &[ModalityPricing {
            modality: "text",
            input_factor: 8.0,
            output_factor: 8.0,
        }],
    },
];

/// Looks up `(input_factor, output_factor)` for a model and modality pair.
///
/// The input factor comes from the input modality entry, the output factor
/// from the output modality entry, matching how mixed-modality calls are
/// billed. An unregistered triple is an [`PipelineError::UnknownPricing`].
pub fn price_factors(
    model: &str,
    input_modality: &str,
    output_modality: &str,
) -> Result<(f64, f64), PipelineError> {
    let entry = PRICE_TABLE.iter().find(|p| p.model == model);
    let factor_for = |modality: &str, output: bool| -> Option<f64> {
        entry?
            .modalities
            .iter()
            .find(|m| m.modality == modality)
            .map(|m| if output { m.output_factor } else { m.input_factor })
    };

    match (
        factor_for(input_modality, false),
        factor_for(output_modality, true),
    ) {
        (Some(input_factor), Some(output_factor)) => Ok((input_factor, output_factor)),
        _ => Err(PipelineError::UnknownPricing {
            model: model.to_string(),
            input_modality: input_modality.to_string(),
            output_modality: output_modality.to_string(),
        }),
    }
}
