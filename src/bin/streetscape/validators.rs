pub fn is_numeric_min(min: usize) -> impl Fn(&str) -> Result<usize, String> + Clone + Send + Sync + 'static {
    move |v: &str| {
        let val = v
            .parse::<usize>()
            .map_err(|_| "must be numeric".to_owned())?;

        if val < min {
            return Err(format!("must be >= {}", min));
        }

        Ok(val)
    }
}

pub fn is_positive(v: &str) -> Result<f64, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if !val.is_finite() || val <= 0.0 {
        return Err("must be > 0".to_owned());
    }

    Ok(val)
}

pub fn is_end_gap(v: &str) -> Result<f64, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if !(0.0..0.5).contains(&val) {
        return Err("must be within [0, 0.5)".to_owned());
    }

    Ok(val)
}

pub fn is_angle(v: &str) -> Result<f64, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if !(-180.0..=180.0).contains(&val) {
        return Err("must be within [-180°, 180°]".to_owned());
    }

    Ok(val)
}
