use std::ffi::OsString;
use stitch_config::{JobConfiguration, ModelToggle, OutputTarget};

/// Express a configuration as the SDK stitcher's command-line flags.
///
/// `-inputs` comes first: the stitcher collects inputs until the next token
/// starting with `-`, so an output flag must follow.
pub fn sdk_args(config: &JobConfiguration) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    flag(&mut args, "inputs");
    args.extend(config.inputs.iter().map(|p| p.clone().into_os_string()));

    match &config.output {
        OutputTarget::File(path) => {
            flag(&mut args, "output");
            args.push(path.clone().into_os_string());
        }
        OutputTarget::ImageSequence {
            dir,
            image_type,
            frame_indices,
        } => {
            flag(&mut args, "image_sequence_dir");
            args.push(dir.clone().into_os_string());
            flag(&mut args, "image_type");
            args.push(image_type.as_str().into());
            if !frame_indices.is_empty() {
                let joined = frame_indices
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join("-");
                flag(&mut args, "export_frame_index");
                args.push(joined.into());
            }
        }
        OutputTarget::Preview => {}
    }

    flag(&mut args, "stitch_type");
    args.push(config.stitch_type.as_str().into());
    if let Some(model) = &config.ai_model {
        flag(&mut args, "ai_stitching_model");
        args.push(model.clone().into_os_string());
    }
    flag(&mut args, "output_size");
    args.push(config.output_size.to_string().into());
    if config.codec.bitrate > 0 {
        flag(&mut args, "bitrate");
        args.push(config.codec.bitrate.to_string().into());
    }

    let features = &config.features;
    for (enabled, name) in [
        (features.flowstate, "enable_flowstate"),
        (features.direction_lock, "enable_directionlock"),
        (features.stitch_fusion, "enable_stitchfusion"),
        (config.codec.h265, "enable_h265_encoder"),
        (!config.codec.cuda, "disable_cuda"),
        (config.codec.soft_encode, "enable_soft_encode"),
        (config.codec.soft_decode, "enable_soft_decode"),
    ] {
        if enabled {
            flag(&mut args, name);
        }
    }

    model_toggle(&mut args, &features.denoise, "enable_denoise", "image_denoise_model");
    model_toggle(&mut args, &features.colorplus, "enable_colorplus", "colorplus_model");
    model_toggle(&mut args, &features.deflicker, "enable_deflicker", "deflicker_model");

    if config.accessory.0 != 0 {
        flag(&mut args, "camera_accessory_type");
        args.push(config.accessory.0.to_string().into());
    }
    args
}

fn flag(args: &mut Vec<OsString>, name: &str) {
    args.push(format!("-{name}").into());
}

fn model_toggle(args: &mut Vec<OsString>, toggle: &ModelToggle, on: &str, model: &str) {
    if !toggle.enabled {
        return;
    }
    flag(args, on);
    if let Some(path) = &toggle.model {
        flag(args, model);
        args.push(path.clone().into_os_string());
    }
}
