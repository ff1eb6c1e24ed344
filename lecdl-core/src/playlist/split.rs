use std::collections::BTreeMap;

use super::{AngleSet, DirectiveKind, PlaylistError, PlaylistResult};

const ENDLIST: &str = "#EXT-X-ENDLIST";

/// Partition a variant playlist into per-angle playlists at the first
/// discontinuity marker. The marker is how the platform multiplexes the two
/// camera feeds into one variant; without it the whole variant is angle 1.
///
/// Angle 1 keeps everything before the marker and gains its own end-of-list
/// directive. Angle 2 takes everything strictly after the marker, inherits
/// angle 1's last key directive when it does not open with one, and is
/// prefixed with the header lines that preceded the first key directive so
/// it is independently playable.
pub fn split_angles(variant: &str) -> PlaylistResult<AngleSet> {
    let lines: Vec<String> = variant.lines().map(str::to_owned).collect();

    let Some(boundary) = lines
        .iter()
        .position(|line| DirectiveKind::of(line) == DirectiveKind::Discontinuity)
    else {
        let mut angles = BTreeMap::new();
        angles.insert(1, lines);
        return Ok(AngleSet::from_angles(angles));
    };

    let headers_end = lines
        .iter()
        .position(|line| DirectiveKind::of(line).is_key())
        .unwrap_or(0);
    let headers = &lines[..headers_end];

    let mut angle1 = lines[..boundary].to_vec();
    angle1.push(ENDLIST.to_string());
    angle1.push(String::new());

    let tail = &lines[boundary + 1..];
    if tail.is_empty() {
        return Err(PlaylistError::EmptySecondAngle);
    }

    let mut angle2 = Vec::with_capacity(headers.len() + tail.len() + 1);
    angle2.extend_from_slice(headers);
    if !DirectiveKind::of(&tail[0]).is_key() {
        let inherited = angle1
            .iter()
            .rev()
            .find(|line| DirectiveKind::of(line).is_key())
            .ok_or(PlaylistError::MissingKeyDirective)?;
        angle2.push(inherited.clone());
    }
    angle2.extend_from_slice(tail);

    let mut angles = BTreeMap::new();
    angles.insert(1, angle1);
    angles.insert(2, angle2);
    Ok(AngleSet::from_angles(angles))
}
